//! Session setup endpoints: the out-of-band half of the registry handoff
//!
//! A client registers its negotiated configuration here, then opens the
//! WebSocket with the returned path. The companion read/delete endpoints
//! exist for inspection and explicit teardown.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::protocol::ChatTurn;
use crate::registry::RegisteredSession;

/// Registration request from the application backend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub session_id: String,
    pub system_prompt: String,
    pub locale: String,
    #[serde(default)]
    pub context_type: String,
    #[serde(default)]
    pub greeting: String,
    /// Prior conversation for resumption
    #[serde(default)]
    pub existing_messages: Vec<ChatTurn>,
}

/// Registration response: where to open the socket
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub session_id: String,
    pub socket_path: String,
}

/// Inspection view of a registered, not-yet-consumed session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub locale: String,
    pub context_type: String,
    pub greeting: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

async fn register(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, Json<serde_json::Value>)> {
    if request.session_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "sessionId is required"})),
        ));
    }

    let session_id = request.session_id.clone();
    state
        .registry
        .register(
            &session_id,
            RegisteredSession {
                system_prompt: request.system_prompt,
                locale: request.locale,
                context_type: request.context_type,
                greeting: request.greeting,
                messages: request.existing_messages,
                created_at: Utc::now(),
            },
        )
        .await;

    tracing::info!(session = %session_id, "session config registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            socket_path: format!("/ws/voice?sessionId={session_id}"),
            session_id,
        }),
    ))
}

async fn inspect(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, StatusCode> {
    let entry = state
        .registry
        .peek(&session_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(SessionView {
        session_id,
        locale: entry.locale,
        context_type: entry.context_type,
        greeting: entry.greeting,
        message_count: entry.messages.len(),
        created_at: entry.created_at,
    }))
}

async fn teardown(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.registry.remove(&session_id).await {
        tracing::info!(session = %session_id, "registration removed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Build the session setup router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/voice/sessions", post(register))
        .route("/api/voice/sessions/{session_id}", get(inspect))
        .route("/api/voice/sessions/{session_id}", delete(teardown))
        .with_state(state)
}
