pub mod api;
pub mod websocket;

use crate::agent::TutorAgent;
use crate::cli::Args;
use log::{ error, info };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const PROMPT_WATCH_INTERVAL: Duration = Duration::from_secs(30);

pub struct Server {
    addr: String,
    agent: Arc<RwLock<TutorAgent>>,
    api_key: Option<String>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<RwLock<TutorAgent>>, api_key: Option<String>, args: Args) -> Self {
        Self {
            addr,
            agent,
            api_key,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.watch_prompts();

        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    /// Picks up edits to the prompt file without a restart.
    fn watch_prompts(&self) {
        let agent = Arc::clone(&self.agent);
        let args = self.args.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROMPT_WATCH_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                // Busy ticks are skipped; a queued writer would stall every reader.
                let Ok(mut guard) = agent.try_write() else {
                    continue;
                };
                match guard.reload_prompts_if_changed(&args).await {
                    Ok(true) => info!("Prompt file change picked up"),
                    Ok(false) => {}
                    Err(e) => error!("Prompt reload failed: {}", e),
                }
            }
        });
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, self.agent.clone(), self.args.clone()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            self.agent.clone(),
            self.api_key.clone(),
            self.args.clone()
        ).await
    }
}
