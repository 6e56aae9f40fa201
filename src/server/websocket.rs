use crate::agent::{ AgentError, TutorAgent };
use crate::cli::Args;
use crate::models::websocket::{ ClientMessage, ServerMessage };

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ debug, info, warn, error };
use futures::{ Sink, SinkExt, StreamExt };

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const MAX_CLOCK_SKEW_SECS: i64 = 300;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::MIN.saturating_add(9)));
}

pub fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

/// Hex HMAC-SHA256 of the timestamp, keyed with the server API key.
pub fn sign_timestamp(secret: &str, ts: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(ts.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `ts`/`sig` query parameters against the shared secret.
pub fn verify_signature(
    secret: &str,
    params: &HashMap<String, String>,
    now: i64
) -> Result<(), &'static str> {
    let ts = params.get("ts").or_else(|| params.get("X-Api-Ts"));
    let sig = params.get("sig").or_else(|| params.get("X-Api-Sign"));
    let (Some(ts), Some(sig)) = (ts, sig) else {
        return Err("missing ts/sig");
    };
    let ts_i: i64 = ts.parse().map_err(|_| "bad timestamp")?;
    if (now - ts_i).abs() > MAX_CLOCK_SKEW_SECS {
        return Err("timestamp out of range");
    }
    match sign_timestamp(secret, ts) {
        Some(expected) if expected.eq_ignore_ascii_case(sig) => Ok(()),
        _ => Err("bad signature"),
    }
}

fn reject(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<RwLock<TutorAgent>>,
    api_key: Option<String>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let protocol = if args.enable_tls && args.tls_cert_path.is_some() && args.tls_key_path.is_some() {
        "wss"
    } else {
        "ws"
    };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    let tls_acceptor = if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
                let config = load_tls_config(cert_path, key_path)?;
                Some(TlsAcceptor::from(config))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        None
    };

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, agent_clone, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, agent_clone, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    agent_clone: Arc<RwLock<TutorAgent>>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };

        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> = form_urlencoded
            ::parse(qs.as_bytes())
            .into_owned()
            .collect();

        match verify_signature(secret, &params, Utc::now().timestamp()) {
            Ok(()) => Ok(response),
            Err(reason) => {
                warn!("Rejected handshake from {}: {}", peer, reason);
                Err(reject(reason))
            }
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, agent_clone).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

/// Serializes and sends; false when the peer is gone.
async fn send_message<T>(tx: &mut T, peer: SocketAddr, msg: &ServerMessage) -> bool
    where T: Sink<Message> + Unpin, T::Error: std::fmt::Display
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message for {}: {}", peer, e);
            return true;
        }
    };
    match tx.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            error!("Error sending to {}: {}", peer, e);
            false
        }
    }
}

/// Runs one chat turn: processing, chunks, response, then any suggestion.
async fn handle_chat<T>(
    tx: &mut T,
    peer: SocketAddr,
    agent: &Arc<RwLock<TutorAgent>>,
    chat_id: &str,
    content: &str,
    user_id: Option<&str>
) -> bool
    where T: Sink<Message> + Unpin, T::Error: std::fmt::Display
{
    if !send_message(tx, peer, &ServerMessage::Processing).await {
        return false;
    }

    // The read lock covers turn setup only; the stream runs without it.
    let turn = agent.read().await.process_message_stream(chat_id, content, user_id).await;
    let turn = match turn {
        Ok(turn) => turn,
        Err(e) => {
            match &e {
                AgentError::UnknownContext(_) | AgentError::EmptyMessage =>
                    warn!("Chat request from {} rejected: {}", peer, e),
                _ => error!("Agent streaming error for {}: {}", peer, e),
            }
            return send_message(tx, peer, &ServerMessage::Error { message: e.to_string() }).await;
        }
    };

    let mut stream = turn.stream;
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(fragment) => {
                reply.push_str(&fragment);
                if !send_message(tx, peer, &ServerMessage::Chunk { content: fragment }).await {
                    return false;
                }
            }
            Err(e) => {
                error!("Stream error for {}: {}", peer, e);
                return send_message(tx, peer, &ServerMessage::Error {
                    message: format!("Stream error: {}", e),
                }).await;
            }
        }
    }

    let done = ServerMessage::Response { content: reply, timestamp: Utc::now().timestamp() };
    if !send_message(tx, peer, &done).await {
        return false;
    }
    if let Some(similar) = turn.similar {
        debug!("Suggesting {} to {} for {}", similar.key, peer, turn.context.key());
        return send_message(tx, peer, &ServerMessage::Suggestion { similar }).await;
    }
    true
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    agent: Arc<RwLock<TutorAgent>>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    send_message(&mut tx, peer, &error_msg).await;
                    break;
                }

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Chat { chat_id, content, user_id }) => {
                                if
                                    !handle_chat(
                                        &mut tx,
                                        peer,
                                        &agent,
                                        &chat_id,
                                        &content,
                                        user_id.as_deref()
                                    ).await
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                let error_msg = ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                };
                                if !send_message(&mut tx, peer, &error_msg).await {
                                    break;
                                }
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    tokio_tungstenite::tungstenite::Error::Capacity(ref cap_err) => {
                        error!("WebSocket capacity error for {}: {}", peer, cap_err);
                        let error_msg = ServerMessage::Error {
                            message: "Server capacity error".to_string(),
                        };
                        send_message(&mut tx, peer, &error_msg).await;
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }
    info!("WebSocket connection closed for {}", peer);
}
