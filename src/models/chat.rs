use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Course,
    Assignment,
    Module,
    Dashboard,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Course => "course",
            ContextKind::Assignment => "assignment",
            ContextKind::Module => "module",
            ContextKind::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "course" => Ok(ContextKind::Course),
            "assignment" => Ok(ContextKind::Assignment),
            "module" => Ok(ContextKind::Module),
            "dashboard" => Ok(ContextKind::Dashboard),
            _ => Err(format!("Unknown context type: '{}'", s)),
        }
    }
}

/// The pedagogical scope a chat session is attached to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    #[serde(rename = "type")]
    pub kind: ContextKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChatContext {
    pub fn dashboard() -> Self {
        Self {
            kind: ContextKind::Dashboard,
            id: None,
            course_id: None,
            title: Some("Dashboard".to_string()),
        }
    }

    /// Grouping key, `"{type}-{id}"` with `dashboard` standing in for a missing id.
    pub fn key(&self) -> String {
        format!("{}-{}", self.kind, self.id.as_deref().unwrap_or("dashboard"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ChatContext>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, context: Option<ChatContext>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
            context,
        }
    }

    pub fn context_key(&self) -> Option<String> {
        self.context.as_ref().map(ChatContext::key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub key: String,
    pub context: ChatContext,
    pub title: String,
    pub first_message: String,
    pub last_message_at: DateTime<Utc>,
    pub message_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarConversation {
    pub key: String,
    pub context: ChatContext,
    pub first_message: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_key_falls_back_to_dashboard() {
        let ctx = ChatContext::dashboard();
        assert_eq!(ctx.key(), "dashboard-dashboard");

        let course = ChatContext {
            kind: ContextKind::Course,
            id: Some("101".to_string()),
            course_id: None,
            title: None,
        };
        assert_eq!(course.key(), "course-101");
    }

    #[test]
    fn test_message_serializes_camel_case_with_type_tag() {
        let msg = Message::new(
            Role::User,
            "hello",
            Some(ChatContext {
                kind: ContextKind::Assignment,
                id: Some("a1".to_string()),
                course_id: Some("101".to_string()),
                title: None,
            })
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["context"]["type"], "assignment");
        assert_eq!(json["context"]["courseId"], "101");
        assert!(json["context"].get("title").is_none());
    }
}
