use crate::agent::{ AgentError, TutorAgent };
use crate::auth::{ self, CanvasOAuthConfig, OAuthError, PendingStates };
use crate::cli::Args;
use crate::course::{ classify, parse_course_text, term_weeks };
use crate::models::user::{ Bookmark, Note, UserSettings };

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use axum::{
    routing::{ get, post, put },
    Router,
    Json,
    extract::{ Path, Query, State },
    response::{ IntoResponse, Redirect, Response },
    http::StatusCode,
};
use serde::{ Deserialize, Serialize };
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

const MISSING_REDIRECT: &str = "/dashboard";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Agent busy")]
    Busy,
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    OAuth(#[from] OAuthError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, redirect) = match &self {
            ApiError::NotFound(_) | ApiError::Agent(AgentError::UnknownContext(_)) =>
                (StatusCode::NOT_FOUND, Some(MISSING_REDIRECT)),
            ApiError::BadRequest(_) | ApiError::Agent(AgentError::EmptyMessage) =>
                (StatusCode::BAD_REQUEST, None),
            ApiError::Busy => (StatusCode::SERVICE_UNAVAILABLE, None),
            ApiError::OAuth(OAuthError::InvalidState(_)) => (StatusCode::BAD_REQUEST, None),
            ApiError::OAuth(OAuthError::InvalidConfig(_)) => (StatusCode::SERVICE_UNAVAILABLE, None),
            ApiError::OAuth(OAuthError::TokenExchangeFailed(_)) => (StatusCode::BAD_GATEWAY, None),
            ApiError::Agent(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        if status.is_server_error() {
            error!("API error: {}", self);
        }
        let body = match redirect {
            Some(to) => json!({ "error": self.to_string(), "redirect": to }),
            None => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
struct AppState {
    agent: Arc<RwLock<TutorAgent>>,
    args: Args,
    oauth: CanvasOAuthConfig,
    pending_states: Arc<PendingStates>,
}

#[derive(Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CleanupRequest {
    text: String,
    #[serde(default = "default_use_ai")]
    use_ai: bool,
}

fn default_use_ai() -> bool {
    true
}

#[derive(Deserialize)]
struct GenerateRequest {
    text: Option<String>,
    prompt: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    content: String,
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct SimilarRequest {
    content: String,
    threshold: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteRequest {
    content: String,
    course_id: Option<String>,
}

#[derive(Deserialize)]
struct BookmarkRequest {
    title: String,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeQuery {
    return_to: Option<String>,
    #[serde(default)]
    json: bool,
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

pub fn router(agent: Arc<RwLock<TutorAgent>>, args: Args) -> Router {
    let app_state = AppState {
        agent,
        oauth: CanvasOAuthConfig::from_args(&args),
        pending_states: Arc::new(PendingStates::default()),
        args,
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/courses", get(list_courses))
        .route("/api/courses/parse", post(parse_course))
        .route("/api/courses/generate", post(generate_course))
        .route("/api/courses/{id}", get(get_course))
        .route("/api/chat/history", get(chat_history))
        .route("/api/chat/similar", post(similar_conversation))
        .route("/api/chat/{chat_id}/context", get(chat_context))
        .route("/api/chat/{chat_id}/messages", get(chat_messages).post(send_message))
        .route("/api/text/cleanup", post(cleanup_text))
        .route("/api/text/suggestions", post(text_suggestions))
        .route("/api/users/{id}", get(get_user))
        .route("/api/users/{id}/settings", put(update_settings))
        .route("/api/users/{id}/notes", post(add_note))
        .route("/api/users/{id}/bookmarks", post(add_bookmark))
        .route("/api/oauth/canvas/authorize", get(canvas_authorize))
        .route("/api/oauth/canvas/callback", get(canvas_callback))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .layer(cors)
        .with_state(app_state)
}

pub async fn start_http_server(
    http_port: u16,
    agent: Arc<RwLock<TutorAgent>>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(agent, args.clone());

    if let (true, Some(cert_path), Some(key_path)) = (
        args.enable_tls,
        args.tls_cert_path.as_ref(),
        args.tls_key_path.as_ref(),
    ) {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

async fn list_courses(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let catalog = state.agent.read().await.catalog();
    Ok(Json(json!(catalog.courses())))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> ApiResult<serde_json::Value> {
    let catalog = state.agent.read().await.catalog();
    let course = catalog.course(&id).ok_or_else(|| ApiError::NotFound(format!("Course '{}' not found", id)))?;
    Ok(Json(json!(course)))
}

async fn parse_course(Json(req): Json<TextRequest>) -> ApiResult<serde_json::Value> {
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".into()));
    }
    let parsed = parse_course_text(&req.text);
    let course_type = classify(&parsed);
    let weeks = term_weeks(&parsed);
    Ok(Json(json!({ "parsed": parsed, "courseType": course_type, "weeks": weeks })))
}

async fn generate_course(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>
) -> ApiResult<serde_json::Value> {
    let text = req.text.filter(|t| !t.trim().is_empty());
    let prompt = req.prompt.filter(|p| !p.trim().is_empty());
    let agent = state.agent.read().await;
    let generated = match (text, prompt) {
        (Some(text), _) => agent.generate_course_from_text(&text).await?,
        (None, Some(prompt)) => agent.generate_course_from_prompt(&prompt).await?,
        (None, None) => {
            return Err(ApiError::BadRequest("either text or prompt is required".into()));
        }
    };
    info!("Generated course '{}' ({:?})", generated.course.name, generated.source);
    Ok(Json(json!(generated)))
}

async fn chat_history(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let history = state.agent.read().await.history().await?;
    Ok(Json(json!(history)))
}

async fn chat_context(
    State(state): State<AppState>,
    Path(chat_id): Path<String>
) -> ApiResult<serde_json::Value> {
    let context = state.agent.read().await.resolve(&chat_id).await?;
    Ok(Json(json!(context)))
}

async fn chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>
) -> ApiResult<serde_json::Value> {
    let (context, messages) = state.agent.read().await.messages(&chat_id).await?;
    Ok(Json(json!({ "context": context, "messages": messages })))
}

async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<ChatRequest>
) -> ApiResult<serde_json::Value> {
    let reply = state.agent
        .read().await
        .process_message(&chat_id, &req.content, req.user_id.as_deref()).await?;
    Ok(Json(json!(reply)))
}

async fn similar_conversation(
    State(state): State<AppState>,
    Json(req): Json<SimilarRequest>
) -> ApiResult<serde_json::Value> {
    let similar = state.agent.read().await.find_similar(&req.content, req.threshold).await?;
    Ok(Json(json!({ "similar": similar })))
}

async fn cleanup_text(
    State(state): State<AppState>,
    Json(req): Json<CleanupRequest>
) -> ApiResult<serde_json::Value> {
    let result = state.agent.read().await.cleanup_text(&req.text, req.use_ai).await;
    Ok(Json(json!(result)))
}

async fn text_suggestions(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>
) -> ApiResult<serde_json::Value> {
    let suggestions = state.agent.read().await.suggest_improvements(&req.text).await;
    Ok(Json(json!({ "suggestions": suggestions })))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<serde_json::Value> {
    let user = state.agent.read().await.user(&id).await?;
    Ok(Json(json!(user)))
}

async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(settings): Json<UserSettings>
) -> ApiResult<serde_json::Value> {
    let user = state.agent.read().await.update_settings(&id, settings).await?;
    Ok(Json(json!(user)))
}

async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>
) -> ApiResult<serde_json::Value> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("note content is required".into()));
    }
    let note = Note::new(req.course_id, req.content);
    let user = state.agent.read().await.add_note(&id, note).await?;
    Ok(Json(json!(user)))
}

async fn add_bookmark(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BookmarkRequest>
) -> ApiResult<serde_json::Value> {
    if req.url.trim().is_empty() {
        return Err(ApiError::BadRequest("bookmark url is required".into()));
    }
    let user = state.agent.read().await.add_bookmark(&id, Bookmark::new(req.title, req.url)).await?;
    Ok(Json(json!(user)))
}

async fn canvas_authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>
) -> Result<Response, ApiError> {
    let (url, oauth_state) = auth::authorize_url(&state.oauth, query.return_to.as_deref())?;
    state.pending_states.issue(&oauth_state);
    info!("Canvas authorization started (return to {})", oauth_state.return_to);
    if query.json {
        return Ok(Json(json!({ "url": url })).into_response());
    }
    Ok(Redirect::temporary(&url).into_response())
}

async fn canvas_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>
) -> Result<Response, ApiError> {
    if let Some(reason) = query.error {
        warn!("Canvas authorization denied: {}", reason);
        return Err(ApiError::BadRequest(format!("Canvas authorization failed: {}", reason)));
    }
    let oauth_state = auth::verify_state(&state.pending_states, query.state.as_deref().unwrap_or_default())?;
    let code = query.code.ok_or_else(|| ApiError::BadRequest("missing authorization code".into()))?;

    let tokens = auth::exchange_code(&state.oauth, &code).await?;
    info!("Canvas tokens stored (mock={})", tokens.mock);
    state.agent.read().await.save_canvas_tokens(tokens).await?;

    Ok(Redirect::to(&oauth_state.return_to).into_response())
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut agent = match state.agent.try_write() {
        Ok(g) => g,
        Err(_) => {
            return ApiError::Busy.into_response();
        }
    };

    let (code, response) = match agent.reload_prompts_if_changed(&state.args).await {
        Ok(changed) =>
            (
                StatusCode::OK,
                ReloadResponse {
                    success: true,
                    message: "Reload complete".into(),
                    details: Some(vec![(if changed { "Prompts reloaded" } else { "Prompts unchanged" }).into()]),
                },
            ),
        Err(e) =>
            (
                StatusCode::BAD_REQUEST,
                ReloadResponse {
                    success: false,
                    message: "Reload errors".into(),
                    details: Some(vec![format!("Prompt error: {}", e)]),
                },
            ),
    };
    (code, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalog;
    use crate::config::prompt::PromptConfig;
    use crate::llm::chat::testing::ScriptedChatClient;
    use crate::llm::chat::ChatClient;
    use crate::store::MemoryStateStore;
    use axum::body::Body;
    use axum::http::Request;
    use clap::Parser;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_slow_model_call_does_not_block_other_requests() {
        let client: Arc<dyn ChatClient> = Arc::new(
            ScriptedChatClient::new(&["Think about what repeats."]).with_delay(Duration::from_secs(2))
        );
        let agent = TutorAgent::with_parts(
            Some(client),
            PromptConfig::builtin().unwrap(),
            Arc::new(MockCatalog::seeded().unwrap()),
            Arc::new(MemoryStateStore::default()),
            0.6
        );
        let app = router(Arc::new(RwLock::new(agent)), Args::parse_from(["lms-tutor"]));

        let chat = tokio::spawn(
            app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/chat/course-101/messages")
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"content":"what is a for loop?"}"#))
                        .unwrap()
                )
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let listing = tokio::time::timeout(
            Duration::from_millis(500),
            app.clone().oneshot(Request::builder().uri("/api/courses").body(Body::empty()).unwrap())
        ).await;
        assert_eq!(listing.expect("course listing waited on the model").unwrap().status(), StatusCode::OK);

        assert_eq!(chat.await.unwrap().unwrap().status(), StatusCode::OK);
    }
}
