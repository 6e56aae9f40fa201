pub mod agent;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod cli;
pub mod config;
pub mod course;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod store;
pub mod text;

use agent::TutorAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP Port: {}", args.http_port.map_or("disabled".to_string(), |p| p.to_string()));
    info!("State Store Type: {}", args.store_type);
    match args.store_type.as_str() {
        "file" => info!("State Store Path: {}", args.store_path),
        "redis" => info!("State Store Redis: {} ({})", args.store_redis_url, args.store_redis_key),
        _ => {}
    }
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Prompts Path: {}", args.prompts_path);
    info!("Similarity Threshold: {}", args.similarity_threshold);
    info!("Canvas Base URL: {}", args.canvas_base_url);
    info!("Production: {}", args.production);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = TutorAgent::new(args.clone()).await?;
    if !agent.has_model() {
        info!("No chat model available; replies use offline guidance");
    }
    let agent = Arc::new(RwLock::new(agent));
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args.server_api_key.clone(), args);
    server.run().await?;

    Ok(())
}
