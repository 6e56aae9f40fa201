mod file;
mod memory;
mod redis;

pub use self::file::FileStateStore;
pub use self::memory::MemoryStateStore;
pub use self::redis::RedisStateStore;

use async_trait::async_trait;
use log::{ info, warn };
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::collections::{ HashMap, HashSet };
use std::sync::Arc;
use thiserror::Error;

use crate::auth::CanvasTokens;
use crate::cli::Args;
use crate::models::chat::Message;
use crate::models::course::Course;
use crate::models::user::UserData;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Users from the browser layout had no id.
pub const LEGACY_USER_ID: &str = "default";

const USER_DATA_FIELDS: &[&str] = &[
    "chatHistories",
    "courseProgress",
    "settings",
    "apiKeys",
    "notes",
    "bookmarks",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("State JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("State redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("State schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        found: u64,
        supported: u32,
    },
    #[error("Unsupported state store type: {0}")]
    UnsupportedType(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub schema_version: u32,
    #[serde(default)]
    pub chat_history: Vec<Message>,
    #[serde(default)]
    pub user_data: HashMap<String, UserData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_oauth: Option<CanvasTokens>,
    #[serde(default)]
    pub generated_courses: Vec<Course>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            chat_history: Vec::new(),
            user_data: HashMap::new(),
            gemini_api_key: None,
            canvas_oauth: None,
            generated_courses: Vec::new(),
        }
    }
}

impl PersistedState {
    pub fn from_json_str(raw: &str) -> Result<Self, StoreError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Reads any known layout, migrating older ones to the current version.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        let Value::Object(obj) = value else {
            warn!("State document is not an object, starting empty");
            return Ok(Self::default());
        };
        match obj.get("schemaVersion").and_then(Value::as_u64) {
            None => Ok(migrate_legacy(obj)),
            Some(v) if v > u64::from(CURRENT_SCHEMA_VERSION) =>
                Err(StoreError::UnsupportedVersion { found: v, supported: CURRENT_SCHEMA_VERSION }),
            Some(_) => Ok(serde_json::from_value(Value::Object(obj))?),
        }
    }

    pub fn user(&self, user_id: &str) -> Option<&UserData> {
        self.user_data.get(user_id)
    }

    pub fn user_mut(&mut self, user_id: &str) -> &mut UserData {
        self.user_data.entry(user_id.to_string()).or_default()
    }
}

/// Browser storage values were often JSON encoded a second time as strings.
fn legacy_field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Option<T> {
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    if let Value::String(s) = value {
        if let Ok(decoded) = serde_json::from_str::<T>(s) {
            return Some(decoded);
        }
    }
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Dropping unreadable legacy field '{}': {}", key, e);
            None
        }
    }
}

fn legacy_messages(obj: &Map<String, Value>) -> Vec<Message> {
    let entries: Vec<Value> = legacy_field(obj, "chatHistory").unwrap_or_default();
    let total = entries.len();
    let messages: Vec<Message> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if messages.len() < total {
        warn!("Dropped {} unreadable legacy messages", total - messages.len());
    }
    messages
}

fn legacy_users(obj: &Map<String, Value>) -> HashMap<String, UserData> {
    let Some(Value::Object(raw)) = legacy_field::<Value>(obj, "userData") else {
        return HashMap::new();
    };
    if raw.keys().any(|k| USER_DATA_FIELDS.contains(&k.as_str())) {
        return match serde_json::from_value::<UserData>(Value::Object(raw)) {
            Ok(user) => HashMap::from([(LEGACY_USER_ID.to_string(), user)]),
            Err(e) => {
                warn!("Dropping unreadable legacy user data: {}", e);
                HashMap::new()
            }
        };
    }
    raw.into_iter()
        .filter_map(|(id, v)| serde_json::from_value::<UserData>(v).ok().map(|u| (id, u)))
        .collect()
}

/// Moves per-user conversation copies into the global history, skipping ids already there.
fn fold_user_histories(history: &mut Vec<Message>, users: &mut HashMap<String, UserData>) {
    let mut seen: HashSet<String> = history
        .iter()
        .map(|m| m.id.clone())
        .collect();
    let before = history.len();
    for user in users.values_mut() {
        for message in user.chat_histories.drain().flat_map(|(_, messages)| messages) {
            if seen.insert(message.id.clone()) {
                history.push(message);
            }
        }
    }
    if history.len() > before {
        history.sort_by_key(|m| m.timestamp);
    }
}

fn migrate_legacy(obj: Map<String, Value>) -> PersistedState {
    let mut chat_history = legacy_messages(&obj);
    let mut user_data = legacy_users(&obj);
    fold_user_histories(&mut chat_history, &mut user_data);
    let state = PersistedState {
        schema_version: CURRENT_SCHEMA_VERSION,
        chat_history,
        user_data,
        gemini_api_key: legacy_field::<String>(&obj, "geminiApiKey").filter(|k| !k.trim().is_empty()),
        canvas_oauth: legacy_field(&obj, "canvasOAuthConfig"),
        generated_courses: Vec::new(),
    };
    info!(
        "Migrated legacy state to schema v{} ({} messages, {} users)",
        CURRENT_SCHEMA_VERSION,
        state.chat_history.len(),
        state.user_data.len()
    );
    state
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<PersistedState, StoreError>;

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

pub fn create_state_store(args: &Args) -> Result<Arc<dyn StateStore>, StoreError> {
    match args.store_type.to_lowercase().as_str() {
        "file" => {
            info!("State will be stored in file: {}", args.store_path);
            Ok(Arc::new(FileStateStore::new(&args.store_path)))
        }
        "redis" => {
            info!("State will be stored in redis at {} (key {})", args.store_redis_url, args.store_redis_key);
            Ok(Arc::new(RedisStateStore::new(&args.store_redis_url, &args.store_redis_key)?))
        }
        "memory" => {
            warn!("State is kept in memory and lost on restart");
            Ok(Arc::new(MemoryStateStore::default()))
        }
        other => Err(StoreError::UnsupportedType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;
    use serde_json::json;

    fn legacy_message() -> Value {
        json!({
            "id": "m1",
            "content": "How do I cite a website in APA?",
            "role": "user",
            "timestamp": "2025-02-01T10:00:00Z",
            "context": { "type": "course", "id": "101", "title": "CSE 110" }
        })
    }

    #[test]
    fn test_legacy_layout_with_encoded_strings_is_migrated() {
        let legacy =
            json!({
            "chatHistory": serde_json::to_string(&json!([legacy_message(), { "broken": true }])).unwrap(),
            "userData": serde_json::to_string(&json!({ "settings": { "theme": "dark" } })).unwrap(),
            "geminiApiKey": "AIza-test-key",
            "canvasOAuthConfig": { "access_token": "tok" }
        });
        let state = PersistedState::from_value(legacy).unwrap();
        assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.chat_history.len(), 1);
        assert_eq!(state.chat_history[0].role, Role::User);
        assert_eq!(state.chat_history[0].context_key().as_deref(), Some("course-101"));
        assert_eq!(state.user(LEGACY_USER_ID).unwrap().settings.theme, "dark");
        assert_eq!(state.gemini_api_key.as_deref(), Some("AIza-test-key"));
        assert_eq!(state.canvas_oauth.unwrap().access_token, "tok");
    }

    #[test]
    fn test_legacy_user_histories_fold_into_global_history() {
        let mut later = legacy_message();
        later["id"] = json!("m2");
        later["timestamp"] = json!("2025-02-01T10:05:00Z");
        let legacy =
            json!({
            "chatHistory": [legacy_message()],
            "userData": { "chatHistories": { "course-101": [legacy_message(), later] } }
        });
        let state = PersistedState::from_value(legacy).unwrap();
        let ids: Vec<&str> = state.chat_history
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(state.user(LEGACY_USER_ID).unwrap().chat_histories.is_empty());
        assert!(!serde_json::to_string(&state).unwrap().contains("chatHistories"));
    }

    #[test]
    fn test_legacy_user_map_keeps_ids() {
        let legacy = json!({ "userData": { "u1": { "notes": [] }, "u2": {} } });
        let state = PersistedState::from_value(legacy).unwrap();
        assert!(state.user("u1").is_some());
        assert!(state.user("u2").is_some());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let err = PersistedState::from_value(json!({ "schemaVersion": 7 })).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { found: 7, supported: 1 }));
    }

    #[test]
    fn test_current_schema_round_trips() {
        let mut state = PersistedState::default();
        state.gemini_api_key = Some("key".into());
        state.user_mut("u1").settings.ai_assistance = false;
        let raw = serde_json::to_string(&state).unwrap();
        assert!(raw.contains("\"schemaVersion\":1"));
        assert_eq!(PersistedState::from_json_str(&raw).unwrap(), state);
        assert_eq!(PersistedState::from_json_str("  ").unwrap(), PersistedState::default());
    }
}
