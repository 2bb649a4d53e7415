//! Health check endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Serialize;

use super::ApiState;

/// Liveness response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Per-credential readiness checks
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub stt: CheckResult,
    pub generation: CheckResult,
    pub synthesis: CheckResult,
}

/// Result of a single check; never reveals credential values
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    const fn missing(name: &'static str) -> Self {
        Self {
            status: "fail",
            message: Some(name),
        }
    }

    fn from(configured: bool, name: &'static str) -> Self {
        if configured {
            Self::ok()
        } else {
            Self::missing(name)
        }
    }
}

/// Liveness probe - is the service running?
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Readiness probe - are the collaborator credentials configured?
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let checks = ReadinessChecks {
        stt: CheckResult::from(state.credentials.stt, "stt_api_key not set"),
        generation: CheckResult::from(state.credentials.generation, "llm_api_key not set"),
        synthesis: CheckResult::from(state.credentials.synthesis, "tts_api_key not set"),
    };

    let all_ok =
        state.credentials.stt && state.credentials.generation && state.credentials.synthesis;
    let status = if all_ok { "ok" } else { "degraded" };
    let http_status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(ReadinessResponse { status, checks }))
}

/// Build the health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}
