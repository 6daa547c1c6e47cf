//! `/terminal/ws/{session_id}`: the bidirectional framed terminal stream.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use termbroker_core::{Session, WriteOutcome};
use termbroker_types::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::extractors::auth::validate_query_token;
use crate::AppState;

const POLICY_VIOLATION: u16 = 1008;
const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
    cwd: Option<String>,
    #[serde(default)]
    reconnect: bool,
    name: Option<String>,
}

pub async fn handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, params))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, params: WsParams) {
    let (mut sender, mut receiver) = socket.split();

    let owner = match validate_query_token(&state, &params.token) {
        Ok(owner) => owner,
        Err(e) => {
            warn!(session = %session_id, error = %e.message, "websocket auth failed");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: POLICY_VIOLATION,
                    reason: "invalid or expired token".into(),
                })))
                .await;
            return;
        }
    };

    let name = params.name.clone().unwrap_or_else(|| "终端".to_string());
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let session = match resolve_session(&state, &session_id, &owner, &name, params.cwd.clone(), params.reconnect, &tx).await {
        Some(session) => session,
        None => {
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: POLICY_VIOLATION,
                    reason: "failed to start session".into(),
                })))
                .await;
            return;
        }
    };

    let client_id = format!("{owner}:{}", Uuid::new_v4());
    let replay = session.attach(client_id.clone()).await;
    if !replay.is_empty() && !params.reconnect {
        let _ = tx.send(ServerMessage::Reconnect {
            data: replay,
            message: "attached to existing session".to_string(),
        });
    }

    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let poll_session = session.clone();
    let poll_client_id = client_id.clone();
    let poll_tx = tx.clone();
    let output_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(OUTPUT_POLL_INTERVAL).await;
            if !poll_session.is_alive().await {
                break;
            }
            let output = poll_session.read_for(&poll_client_id).await;
            if !output.is_empty() && poll_tx.send(ServerMessage::Output { data: output }).is_err() {
                break;
            }
        }
    });

    let mut explicit_close = false;
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Input { data }) => match session.write(data.as_bytes()).await {
                    WriteOutcome::Ok => {}
                    WriteOutcome::SessionClosed => {
                        let _ = tx.send(ServerMessage::Error {
                            message: "session closed".to_string(),
                        });
                        break;
                    }
                },
                Ok(ClientMessage::Resize { rows, cols }) => {
                    session.resize(rows, cols).await;
                }
                Ok(ClientMessage::Ping) => {
                    let _ = tx.send(ServerMessage::Pong);
                }
                Ok(ClientMessage::Close) => {
                    explicit_close = true;
                    break;
                }
                Err(e) => {
                    debug!(session = %session_id, error = %e, "dropping malformed frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(session = %session_id, error = %e, "websocket error");
                break;
            }
        }
    }

    output_task.abort();
    session.detach(&client_id).await;

    if explicit_close && session.client_count().await == 0 {
        if session.close().await {
            state.manager.close(&session_id).await;
            info!(session = %session_id, "session closed, no clients remaining");
        }
    }

    drop(tx);
    let _ = forward_task.await;
}

#[allow(clippy::too_many_arguments)]
async fn resolve_session(
    state: &AppState,
    session_id: &str,
    owner: &str,
    name: &str,
    cwd: Option<String>,
    reconnect: bool,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<Arc<Session>> {
    use termbroker_core::Reconnect;

    if reconnect {
        match state.manager.reconnect(session_id, owner).await {
            Reconnect::Live(replay) => {
                let _ = tx.send(ServerMessage::Reconnect {
                    data: replay,
                    message: "session reconnected".to_string(),
                });
                return state.manager.get(session_id).await;
            }
            Reconnect::Recovered(buffer) => {
                let _ = tx.send(ServerMessage::Reconnect {
                    data: buffer,
                    message: "session reconnected".to_string(),
                });
            }
            Reconnect::NotFound => {
                let _ = tx.send(ServerMessage::ReconnectFailed {
                    message: "session not found".to_string(),
                });
            }
            Reconnect::Expired => {
                let _ = tx.send(ServerMessage::ReconnectFailed {
                    message: "session expired".to_string(),
                });
            }
        }
    }

    match state
        .manager
        .create(
            session_id.to_string(),
            owner.to_string(),
            name.to_string(),
            24,
            80,
            cwd,
        )
        .await
    {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(session = %session_id, error = %e, "failed to start pty for session");
            None
        }
    }
}
