use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use uuid::Uuid;

use super::chat::Message;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    /// Legacy per-user copies of the conversation; folded into the global
    /// history on migration and never written back.
    #[serde(default, skip_serializing)]
    pub chat_histories: HashMap<String, Vec<Message>>,
    #[serde(default)]
    pub course_progress: HashMap<String, CourseProgress>,
    #[serde(default)]
    pub settings: UserSettings,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    #[serde(default)]
    pub completed_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visited: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_true")]
    pub ai_assistance: bool,
    #[serde(default)]
    pub email_notifications: bool,
}

fn default_theme() -> String {
    "light".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            ai_assistance: true,
            email_notifications: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn new(course_id: Option<String>, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            course_id,
            content,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(title: String, url: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            url,
            created_at: Utc::now(),
        }
    }
}
