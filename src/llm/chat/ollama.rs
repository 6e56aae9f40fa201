use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use std::error::Error as StdError;
use super::{ ChatClient, ChatStream, CompletionResponse, http_stream_generate };
use crate::llm::{ LlmConfig, LlmType };
use log::info;

const DEFAULT_MODEL: &str = "llama3.2:3b";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    response: String,
}

fn parse_ollama_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str::<StreamResponse>(line)
        .ok()
        .map(|r| r.response)
        .filter(|r| !r.is_empty())
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaClient".into());
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    pub async fn generate(
        &self,
        prompt: &str
    ) -> Result<GenerateResponse, Box<dyn StdError + Send + Sync>> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let req = GenerateRequest {
            model: self.completion_model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };
        let resp = self.http.post(&url).json(&req).send().await?.error_for_status()?;
        let data = resp.json::<GenerateResponse>().await?;
        Ok(data)
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        info!("OllamaClient::complete() → model={}", self.completion_model);
        let gen_resp = self.generate(prompt).await?;
        Ok(CompletionResponse { response: gen_resp.response })
    }

    async fn complete_stream(
        &self,
        prompt: &str
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
        let req = GenerateRequest {
            model: self.completion_model.clone(),
            prompt: prompt.to_string(),
            stream: true,
        };
        http_stream_generate(self.base_url.clone(), "/api/generate", req, parse_ollama_line, None).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{ method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    #[test]
    fn test_parse_ollama_line() {
        assert_eq!(
            parse_ollama_line(r#"{"response":"Hel","done":false}"#),
            Some("Hel".to_string())
        );
        assert_eq!(parse_ollama_line(r#"{"response":"","done":true}"#), None);
    }

    #[tokio::test]
    async fn test_stream_against_local_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(
                    "{\"response\":\"Loops \",\"done\":false}\n{\"response\":\"repeat.\",\"done\":true}\n"
                )
            )
            .mount(&server).await;

        let client = OllamaClient::new(Some(server.uri()), None);
        let stream = client.complete_stream("what is a loop").await.unwrap();
        let parts: Vec<String> = stream
            .map(|r| r.unwrap())
            .collect().await;
        assert_eq!(parts.concat(), "Loops repeat.");
    }
}
