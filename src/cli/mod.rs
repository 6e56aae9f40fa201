use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- State Store Args ---
    /// Where persisted state lives (file, redis, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "file")]
    pub store_type: String,

    /// Path of the JSON state file when STORE_TYPE=file.
    #[arg(long, env = "STORE_PATH", default_value = "data/state.json")]
    pub store_path: String,

    /// Redis endpoint when STORE_TYPE=redis (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub store_redis_url: String,

    /// Redis key holding the state document.
    #[arg(long, env = "STORE_REDIS_KEY", default_value = "lms-tutor:state")]
    pub store_redis_key: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API key for the Chat LLM provider. Empty means the stored Gemini key, if any.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-1.5-flash-latest, llama3.2:3b)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Tutor Args ---
    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    /// Minimum similarity for suggesting an earlier conversation (0.0 to 1.0).
    #[arg(long, env = "SIMILARITY_THRESHOLD", default_value = "0.6")]
    pub similarity_threshold: f64,

    /// Number of earlier messages included in the tutoring prompt.
    #[arg(long, env = "HISTORY_PROMPT_LEN", default_value = "6")]
    pub history_prompt_len: usize,

    // --- Canvas OAuth Args ---
    /// Base URL of the Canvas instance.
    #[arg(long, env = "CANVAS_BASE_URL", default_value = "https://canvas.instructure.com")]
    pub canvas_base_url: String,

    #[arg(long, env = "CANVAS_CLIENT_ID", default_value = "")]
    pub canvas_client_id: String,

    #[arg(long, env = "CANVAS_CLIENT_SECRET")]
    pub canvas_client_secret: Option<String>,

    #[arg(
        long,
        env = "CANVAS_REDIRECT_URI",
        default_value = "http://localhost:4001/api/oauth/canvas/callback"
    )]
    pub canvas_redirect_uri: String,

    /// Production mode: real Canvas token exchange instead of mock tokens.
    #[arg(long, env = "PRODUCTION", default_value = "false")]
    pub production: bool,

    // --- Server Args ---
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API. The API is disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must sign requests with it.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
