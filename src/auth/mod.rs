//! Canvas LMS OAuth2 authorization-code flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{ DateTime, Utc };
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use std::sync::{ Mutex, PoisonError };
use std::time::{ Duration, Instant };
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::cli::Args;

const DEFAULT_RETURN_PATH: &str = "/";
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Debug)]
pub struct CanvasOAuthConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub production: bool,
}

impl CanvasOAuthConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            base_url: args.canvas_base_url.clone(),
            client_id: args.canvas_client_id.clone(),
            client_secret: args.canvas_client_secret.clone().filter(|s| !s.trim().is_empty()),
            redirect_uri: args.canvas_redirect_uri.clone(),
            production: args.production,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, OAuthError> {
        let base = Url::parse(&self.base_url).map_err(|e|
            OAuthError::InvalidConfig(format!("base url '{}': {}", self.base_url, e))
        )?;
        base.join(path).map_err(|e| OAuthError::InvalidConfig(e.to_string()))
    }

    fn uses_mock_tokens(&self) -> bool {
        !self.production || self.client_secret.is_none()
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid Canvas OAuth configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid OAuth state: {0}")]
    InvalidState(String),
    #[error("Failed to exchange token: {0}")]
    TokenExchangeFailed(String),
}

/// Round-tripped through Canvas in the `state` parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthState {
    pub nonce: String,
    pub return_to: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasTokens {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type", alias = "token_type")]
    pub token_type: String,
    #[serde(default, alias = "expires_in", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<CanvasUser>,
    #[serde(default)]
    pub mock: bool,
    #[serde(default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Nonces handed out with authorization URLs. Each is accepted once, within the TTL.
pub struct PendingStates {
    issued: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl Default for PendingStates {
    fn default() -> Self {
        Self::with_ttl(STATE_TTL)
    }
}

impl PendingStates {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { issued: Mutex::new(HashMap::new()), ttl }
    }

    pub fn issue(&self, state: &OAuthState) {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        issued.retain(|_, at| at.elapsed() <= ttl);
        issued.insert(state.nonce.clone(), Instant::now());
    }

    pub fn consume(&self, state: &OAuthState) -> Result<(), OAuthError> {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        match issued.remove(&state.nonce) {
            Some(at) if at.elapsed() <= self.ttl => Ok(()),
            Some(_) => Err(OAuthError::InvalidState("state has expired".into())),
            None => Err(OAuthError::InvalidState("state was not issued by this server".into())),
        }
    }
}

pub fn encode_state(state: &OAuthState) -> Result<String, OAuthError> {
    let json = serde_json::to_vec(state).map_err(|e| OAuthError::InvalidState(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_state(state: &str) -> Result<OAuthState, OAuthError> {
    let bytes = URL_SAFE_NO_PAD.decode(state.trim()).map_err(|e|
        OAuthError::InvalidState(e.to_string())
    )?;
    serde_json::from_slice(&bytes).map_err(|e| OAuthError::InvalidState(e.to_string()))
}

fn sanitize_return_path(return_to: Option<&str>) -> String {
    match return_to.map(str::trim) {
        // Only same-origin paths; "//host" would leave the site.
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => DEFAULT_RETURN_PATH.to_string(),
    }
}

/// Decodes a callback `state` and checks it against the issued nonces.
pub fn verify_state(pending: &PendingStates, state: &str) -> Result<OAuthState, OAuthError> {
    let decoded = decode_state(state)?;
    pending.consume(&decoded)?;
    Ok(decoded)
}

/// Canvas authorization URL and the state it carries.
pub fn authorize_url(
    config: &CanvasOAuthConfig,
    return_to: Option<&str>
) -> Result<(String, OAuthState), OAuthError> {
    if config.client_id.trim().is_empty() {
        return Err(OAuthError::InvalidConfig("client id is not set".into()));
    }
    let state = OAuthState {
        nonce: Uuid::new_v4().simple().to_string(),
        return_to: sanitize_return_path(return_to),
    };
    let mut url = config.endpoint("/login/oauth2/auth")?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("state", &encode_state(&state)?);
    Ok((url.to_string(), state))
}

fn mock_tokens() -> CanvasTokens {
    CanvasTokens {
        access_token: format!("mock-access-{}", Uuid::new_v4().simple()),
        refresh_token: Some(format!("mock-refresh-{}", Uuid::new_v4().simple())),
        token_type: default_token_type(),
        expires_in: Some(3600),
        user: Some(CanvasUser { id: 1, name: "Demo Student".to_string() }),
        mock: true,
        obtained_at: Utc::now(),
    }
}

pub async fn exchange_code(config: &CanvasOAuthConfig, code: &str) -> Result<CanvasTokens, OAuthError> {
    if code.trim().is_empty() {
        return Err(OAuthError::TokenExchangeFailed("authorization code is empty".into()));
    }
    if config.uses_mock_tokens() {
        warn!("Canvas token exchange is mocked (production={})", config.production);
        return Ok(mock_tokens());
    }

    let url = config.endpoint("/login/oauth2/token")?;
    info!("Exchanging Canvas authorization code at {}", url);
    let secret = config.client_secret.as_deref().unwrap_or_default();
    let resp = reqwest::Client
        ::new()
        .post(url)
        .form(
            &[
                ("grant_type", "authorization_code"),
                ("client_id", config.client_id.as_str()),
                ("client_secret", secret),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("code", code),
            ]
        )
        .send().await
        .map_err(|e| OAuthError::TokenExchangeFailed(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        error!("Canvas token exchange failed: {} {}", status, body);
        return Err(OAuthError::TokenExchangeFailed(format!("Canvas answered {}", status)));
    }
    resp.json::<CanvasTokens>().await.map_err(|e| OAuthError::TokenExchangeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{ body_string_contains, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn config(base_url: &str, production: bool) -> CanvasOAuthConfig {
        CanvasOAuthConfig {
            base_url: base_url.to_string(),
            client_id: "10000000000001".to_string(),
            client_secret: Some("s3cret".to_string()),
            redirect_uri: "http://localhost:4001/api/oauth/canvas/callback".to_string(),
            production,
        }
    }

    #[test]
    fn test_authorize_url_carries_state() {
        let (url, state) = authorize_url(
            &config("https://canvas.example.edu", false),
            Some("/courses/101")
        ).unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/login/oauth2/auth");
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "10000000000001");
        let decoded = decode_state(&pairs["state"]).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.return_to, "/courses/101");
    }

    #[test]
    fn test_offsite_return_path_is_replaced() {
        let (_, state) = authorize_url(
            &config("https://canvas.example.edu", false),
            Some("//evil.example")
        ).unwrap();
        assert_eq!(state.return_to, "/");
    }

    #[test]
    fn test_issued_state_is_accepted_once() {
        let pending = PendingStates::default();
        let (url, state) = authorize_url(&config("https://canvas.example.edu", false), None).unwrap();
        pending.issue(&state);
        let raw = Url::parse(&url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert_eq!(verify_state(&pending, &raw).unwrap(), state);
        assert!(matches!(verify_state(&pending, &raw), Err(OAuthError::InvalidState(_))));
    }

    #[test]
    fn test_forged_and_expired_states_are_rejected() {
        let pending = PendingStates::default();
        let forged = encode_state(
            &(OAuthState { nonce: "n1".into(), return_to: "/".into() })
        ).unwrap();
        assert!(matches!(verify_state(&pending, &forged), Err(OAuthError::InvalidState(_))));

        let expiring = PendingStates::with_ttl(Duration::ZERO);
        let state = OAuthState { nonce: "n2".into(), return_to: "/".into() };
        expiring.issue(&state);
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(expiring.consume(&state), Err(OAuthError::InvalidState(_))));
    }

    #[test]
    fn test_decode_state_rejects_garbage() {
        assert!(matches!(decode_state("not*base64"), Err(OAuthError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_development_exchange_returns_mock_tokens() {
        let tokens = exchange_code(&config("https://canvas.example.edu", false), "abc").await.unwrap();
        assert!(tokens.mock);
        assert!(tokens.access_token.starts_with("mock-access-"));
    }

    #[tokio::test]
    async fn test_production_exchange_posts_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth2/token"))
            .and(body_string_contains("code=abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({
                        "access_token": "real-token",
                        "token_type": "Bearer",
                        "refresh_token": "refresh",
                        "expires_in": 3600,
                        "user": { "id": 42, "name": "Ada" }
                    })
                )
            )
            .mount(&server).await;

        let tokens = exchange_code(&config(&server.uri(), true), "abc").await.unwrap();
        assert_eq!(tokens.access_token, "real-token");
        assert_eq!(tokens.user.unwrap().id, 42);
        assert!(!tokens.mock);
    }

    #[tokio::test]
    async fn test_production_exchange_surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth2/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server).await;

        let err = exchange_code(&config(&server.uri(), true), "abc").await.unwrap_err();
        assert!(matches!(err, OAuthError::TokenExchangeFailed(_)));
    }
}
