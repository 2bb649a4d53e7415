//! HTTP and WebSocket surface of the sidecar

pub mod health;
pub mod sessions;
pub mod websocket;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, mpsc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::VoiceSettings;
use crate::coordinator::SessionCommand;
use crate::pipeline::VoicePipeline;
use crate::registry::SessionRegistry;
use crate::voice::Synthesizer;

/// Live sessions, keyed by session id
pub type ActiveSessions = Arc<RwLock<HashMap<String, mpsc::Sender<SessionCommand>>>>;

/// Which required credentials are configured, for readiness reporting
#[derive(Debug, Clone, Copy)]
pub struct CredentialStatus {
    pub stt: bool,
    pub generation: bool,
    pub synthesis: bool,
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: SessionRegistry,
    pub sessions: ActiveSessions,
    pub pipeline: Arc<VoicePipeline>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub settings: VoiceSettings,
    pub credentials: CredentialStatus,
    pub started_at: Instant,
}

/// Assemble the full router
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(sessions::router(state.clone()))
        .merge(websocket::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<ApiState>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "voicelink listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
