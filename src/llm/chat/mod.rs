pub mod ollama;
pub mod gemini;

use async_trait::async_trait;
use futures::{ Stream, StreamExt, Future };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::gemini::GeminiChatClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type ChatStream = Pin<
    Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>
>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    /// Streams the reply in fragments. Providers without native streaming send
    /// the full completion as a single fragment.
    async fn complete_stream(
        &self,
        prompt: &str
    ) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
        let response = self.complete(prompt).await?.response;
        full_response_as_stream(move || async move { Ok(response) })
    }

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn create_streaming_response<F, Fut>(
    response_fn: F
) -> Result<ChatStream, Box<dyn StdError + Send + Sync>>
where
    F: FnOnce(mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

pub fn full_response_as_stream<F, Fut>(
    response_fn: F
) -> Result<ChatStream, Box<dyn StdError + Send + Sync>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<String, Box<dyn StdError + Send + Sync>>> + Send + 'static,
{
    create_streaming_response(move |tx| async move {
        match response_fn().await {
            Ok(response) => {
                let _ = tx.send(Ok(response)).await;
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    })
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// POSTs `payload` and turns each line of the streamed body into a fragment via `line_parser`.
pub async fn http_stream_generate(
    base_url: String,
    route: &str,
    payload: impl serde::Serialize + Send + 'static,
    line_parser: fn(&str) -> Option<String>,
    headers: Option<Vec<(String, String)>>
) -> Result<ChatStream, Box<dyn StdError + Send + Sync>> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), route);
    let client = reqwest::Client::new();
    let mut req = client.post(&url).json(&payload);

    if let Some(header_list) = headers {
        for (name, value) in header_list {
            req = req.header(name, value);
        }
    }

    // Connection and status errors surface here so callers can fall back.
    let resp = req.send().await?.error_for_status()?;

    create_streaming_response(move |tx| async move {
        let mut bytes = resp.bytes_stream();
        let mut pending = String::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    pending.push_str(&String::from_utf8_lossy(&buf));
                    while let Some(pos) = pending.find('\n') {
                        let line: String = pending.drain(..=pos).collect();
                        if let Some(tok) = line_parser(&line) {
                            if tx.send(Ok(tok)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            }
        }
        if let Some(tok) = line_parser(&pending) {
            let _ = tx.send(Ok(tok)).await;
        }
    })
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedChatClient;
    use super::*;

    #[tokio::test]
    async fn test_default_stream_yields_full_reply() {
        let client = ScriptedChatClient::new(&["whole reply"]);
        let mut stream = client.complete_stream("prompt").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "whole reply");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_surfaces_completion_error() {
        let client = ScriptedChatClient::failing();
        assert!(client.complete_stream("prompt").await.is_err());
    }
}
