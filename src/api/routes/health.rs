//! Health Routes
//!
//! - GET / - Service banner
//! - GET /health/live - Liveness check (process is alive)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{HealthResponse, StatusResponse};
use crate::api::state::AppState;

/// GET /
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "active",
        service: "AI-ITS Orchestration Server",
    })
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
///
/// Without a provider key the server still answers with fallbacks, so it
/// reports "degraded" rather than failing.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ai_configured = state.ai.is_configured();

    Json(HealthResponse {
        status: if ai_configured { "healthy" } else { "degraded" }.to_string(),
        ai_configured,
        model: state.ai.model_name().map(str::to_string),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_root_banner() {
        let Json(body) = root().await;
        assert_eq!(body.status, "active");
        assert_eq!(body.service, "AI-ITS Orchestration Server");
    }
}
