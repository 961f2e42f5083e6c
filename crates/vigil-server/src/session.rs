use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Duration;
use vigil_common::id::now_millis;
use vigil_common::proto::{AgentHello, Frame};
use vigil_common::types::{Agent, AgentStatus};

/// Validates the API key an agent presents during the handshake.
///
/// Real key management is an external concern; the server only needs this
/// seam. The built-in implementation compares against the configured shared
/// secret, or accepts everything when none is configured.
pub trait ApiKeyValidator: Send + Sync {
    fn validate(&self, key: &str) -> bool;
}

pub struct StaticKeyValidator {
    key: Option<String>,
}

impl StaticKeyValidator {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }
}

impl ApiKeyValidator for StaticKeyValidator {
    fn validate(&self, key: &str) -> bool {
        match &self.key {
            Some(expected) => expected == key,
            None => true,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// WebSocket upgrade for `/api/agent/ws`.
///
/// The upgrade request carries the agent's API key as a bearer token and
/// its identity fields as query parameters; the key is validated before any
/// session state exists.
pub async fn agent_ws_handler(
    State(state): State<AppState>,
    Query(hello): Query<AgentHello>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let key = bearer_token(&headers).unwrap_or_default();
    if !state.api_keys.validate(key) {
        tracing::warn!(agent_id = %hello.id, "Agent handshake rejected: invalid API key");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if hello.id.is_empty() || hello.name.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "agent id and name are required",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| run_session(socket, state, hello))
}

async fn run_session(socket: WebSocket, state: AppState, hello: AgentHello) {
    let agent_id = hello.id.clone();
    let now = now_millis();
    let agent = Agent {
        id: hello.id,
        name: hello.name,
        hostname: hello.hostname,
        os: hello.os,
        arch: hello.arch,
        version: hello.version,
        location: hello.location,
        status: AgentStatus::Online,
        last_seen_at: now,
        created_at: now,
        updated_at: now,
        ..Agent::default()
    };
    if let Err(e) = state.store.register_agent(&agent) {
        tracing::error!(agent_id, error = %e, "Failed to register agent row");
        return;
    }

    let (session_tx, mut session_rx) = mpsc::channel::<String>(32);
    let epoch = state.registry.register(&agent_id, session_tx);
    tracing::info!(agent_id, "Agent connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Single writer per connection: everything outbound funnels through the
    // session channel.
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = session_rx.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        // Channel closed: the session was replaced or the server is
        // shutting down. Close the socket so the agent reconnects.
        let _ = ws_sender.close().await;
    });

    let read_deadline = Duration::from_secs(state.config.heartbeat_interval_secs.max(1) * 2);
    let ingest = state.ingest.clone();
    let read_agent_id = agent_id.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let next = tokio::time::timeout(read_deadline, ws_receiver.next()).await;
            let msg = match next {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::debug!(agent_id = %read_agent_id, error = %e, "Socket read error");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        agent_id = %read_agent_id,
                        deadline_secs = read_deadline.as_secs(),
                        "Heartbeat deadline missed, dropping session"
                    );
                    break;
                }
            };

            match msg {
                Message::Text(text) => match Frame::from_json(&text) {
                    Ok(frame) => ingest.handle_frame(&read_agent_id, frame).await,
                    Err(e) => {
                        // Malformed frames are dropped; the connection
                        // survives.
                        tracing::warn!(
                            agent_id = %read_agent_id,
                            error = %e,
                            "Dropping malformed frame"
                        );
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.deregister(&agent_id, epoch);
    tracing::info!(agent_id, "Agent disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_key_validator_with_secret() {
        let validator = StaticKeyValidator::new(Some("s3cret".into()));
        assert!(validator.validate("s3cret"));
        assert!(!validator.validate("wrong"));
        assert!(!validator.validate(""));
    }

    #[test]
    fn static_key_validator_disabled_accepts_all() {
        let validator = StaticKeyValidator::new(None);
        assert!(validator.validate(""));
        assert!(validator.validate("anything"));
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        let mut basic = HeaderMap::new();
        basic.insert("authorization", "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&basic), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
