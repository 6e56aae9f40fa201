use async_trait::async_trait;
use std::error::Error as StdError;
use serde::{ Deserialize, Serialize };
use log::{ info, warn };

use super::{ ChatClient, ChatStream, CompletionResponse, http_stream_generate };
use crate::llm::LlmConfig;
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::LLMProvider;

const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize)]
struct GeminiStreamRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: String,
}

/// Handles both the SSE (`data: {...}`) and the JSON-array framing of
/// `streamGenerateContent`.
fn parse_gemini_line(line: &str) -> Option<String> {
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if line.is_empty() || line == "[" || line == "]" || line == "," {
        return None;
    }

    let json_obj = line.trim_start_matches(['[', ',']).trim_end_matches([',', ']']);
    if !json_obj.starts_with('{') || !json_obj.ends_with('}') {
        return None;
    }

    serde_json::from_str::<GoogleChunk>(json_obj)
        .ok()
        .and_then(|gc| {
            let text: String = gc.candidates
                .first()?
                .content.parts.iter()
                .map(|p| p.text.as_str())
                .collect();
            if text.is_empty() { None } else { Some(text) }
        })
}

pub struct GeminiChatClient {
    llm: Box<dyn LLMProvider + Send + Sync>,
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut builder = LLMBuilder::new()
            .backend(LLMBackend::Google)
            .api_key(api_key.clone())
            .model(&chat_model)
            .stream(false);

        if let Some(tokens) = max_tokens {
            builder = builder.max_tokens(tokens);
        }
        if let Some(temp) = temperature {
            builder = builder.temperature(temp);
        }

        let llm_provider = builder.build()?;

        Ok(Self {
            llm: llm_provider,
            api_key,
            model: chat_model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| "Gemini API key is required for GeminiChatClient".to_string())?;
        let model = config.completion_model.clone();
        let base_url = config.base_url.clone();

        Self::new(api_key, model, base_url, None, Some(0.4))
    }

    fn stream_endpoint(&self) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("{}/{}", DEFAULT_API_ROOT, self.model))
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: prompt.to_string(),
            message_type: MessageType::Text,
        }];
        info!("GeminiChatClient::complete() → model={}", self.model);
        let resp = self.llm.chat(&messages).await?;
        let text = resp
            .text()
            .map(|s| s.to_string())
            .unwrap_or_else(|| resp.to_string());
        Ok(CompletionResponse { response: text })
    }

    async fn complete_stream(
        &self,
        prompt: &str
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
        let endpoint = self.stream_endpoint();
        info!("GeminiChatClient::complete_stream() → model={} endpoint={}", self.model, endpoint);

        let payload = GeminiStreamRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };
        let route_suffix = format!(":streamGenerateContent?alt=sse&key={}", self.api_key);
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        match
            http_stream_generate(endpoint, &route_suffix, payload, parse_gemini_line, Some(headers)).await
        {
            Ok(stream) => Ok(stream),
            Err(e) => {
                warn!("Gemini streaming failed ({}), falling back to a single completion", e);
                let text = self.complete(prompt).await?.response;
                super::full_response_as_stream(move || async move { Ok(text) })
            }
        }
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"},{"text":" world"}]}}]}"#;
        assert_eq!(parse_gemini_line(line), Some("Hello world".to_string()));
    }

    #[test]
    fn test_parse_array_framed_line() {
        let line = r#"[{"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]},"#;
        assert_eq!(parse_gemini_line(line), Some("Hi".to_string()));
        assert_eq!(parse_gemini_line("]"), None);
        assert_eq!(parse_gemini_line(""), None);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let config = LlmConfig { api_key: Some("  ".into()), ..LlmConfig::default() };
        assert!(GeminiChatClient::from_config(&config).is_err());
    }
}
