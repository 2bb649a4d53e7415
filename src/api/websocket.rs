//! WebSocket endpoint: transport glue between the socket and the coordinator
//!
//! Frames are decoded here and forwarded as commands; everything stateful
//! lives in the session coordinator. Outgoing events flow through an mpsc
//! channel into a dedicated send task.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::ApiState;
use crate::coordinator::{SessionCommand, SessionConfig, SessionCoordinator, SessionDeps};
use crate::protocol::{ClientMessage, ServerMessage};

/// Query parameters for the voice socket
#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Build the WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws/voice", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ApiState>, session_id: Option<String>) {
    let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
        tracing::warn!("voice socket without sessionId, closing");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "missing sessionId".into(),
            })))
            .await;
        return;
    };

    // One-shot handoff: the registry entry is consumed here. A socket with
    // no entry stays open and waits for an explicit init message.
    let config = state
        .registry
        .take(&session_id)
        .await
        .map(SessionConfig::from);

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);

    let deps = SessionDeps {
        pipeline: state.pipeline.clone(),
        synthesizer: state.synthesizer.clone(),
        registry: state.registry.clone(),
        settings: state.settings,
    };
    let (command_tx, _coordinator) =
        SessionCoordinator::spawn(session_id.clone(), config, deps, out_tx.clone());

    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), command_tx.clone());
    tracing::info!(session = %session_id, "voice socket connected");

    // Forward coordinator events to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let ended = matches!(message, ServerMessage::Ended);
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize event");
                    continue;
                }
            }
            if ended {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // Decode client frames into coordinator commands
    let session_for_recv = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(parsed) => {
                        if command_tx
                            .send(SessionCommand::Client(parsed))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(session = %session_for_recv, error = %e, "malformed message");
                        let _ = out_tx
                            .send(ServerMessage::Error {
                                error: format!("invalid message: {e}"),
                            })
                            .await;
                    }
                },
                Message::Binary(data) => {
                    if command_tx
                        .send(SessionCommand::BinaryAudio(data.to_vec()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        // Socket gone or closing; let the coordinator clean up
        let _ = command_tx.send(SessionCommand::Closed).await;
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.sessions.write().await.remove(&session_id);
    tracing::info!(session = %session_id, "voice socket disconnected");
}
