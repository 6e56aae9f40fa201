use serde::{ Serialize, Deserialize };

use super::chat::SimilarConversation;

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        #[serde(rename = "chatId")]
        chat_id: String,
        content: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "chunk")] Chunk {
        content: String,
    },
    #[serde(rename = "response")] Response {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "suggestion")] Suggestion {
        similar: SimilarConversation,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_chat_message_parses() {
        let raw = r#"{"type":"chat","chatId":"course-101","content":"What is due?"}"#;
        match serde_json::from_str::<ClientMessage>(raw).unwrap() {
            ClientMessage::Chat { chat_id, content, user_id } => {
                assert_eq!(chat_id, "course-101");
                assert_eq!(content, "What is due?");
                assert!(user_id.is_none());
            }
        }
    }

    #[test]
    fn test_processing_serializes_as_bare_tag() {
        let json = serde_json::to_string(&ServerMessage::Processing).unwrap();
        assert_eq!(json, r#"{"type":"processing"}"#);
    }
}
