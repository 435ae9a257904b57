//! Proxy REST API
//!
//! HTTP layer between the portal and the generative-language provider,
//! built with Axum. Handlers are stateless apart from the shared [`AppState`].
//!
//! # Endpoints
//!
//! ## AI
//! - `POST /api/ai/chat` - Tutor reply for a message, lesson context and history
//! - `POST /api/ai/diagnostic` - Multiple-choice pre-test for a topic
//! - `POST /api/ai/classify` - Learning level from a performance record
//! - `POST /api/ai/placement` - Ten-question placement assessment
//!
//! ## Health
//! - `GET /` - Service banner
//! - `GET /health/live` - Liveness check
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use pesta::api::{serve, AppState};
//! use pesta::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let state = AppState::from_config(config);
//!     serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let ai_routes = Router::new()
        .route("/chat", post(routes::ai::chat))
        .route("/diagnostic", post(routes::ai::diagnostic))
        .route("/classify", post(routes::ai::classify))
        .route("/placement", post(routes::ai::placement));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let body_limit = state.config.server.max_body_size;
    let cors = cors_layer(&state.config.server);
    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::health::root))
        .nest("/api/ai", ai_routes)
        .nest("/health", health_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive unless origins are configured
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the proxy server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.server.addr();
    let ai_configured = state.ai.is_configured();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, ai_configured, "AI server listening");
    if !ai_configured {
        tracing::warn!("AI_API_KEY is not set; chat and quiz generation will return fallbacks");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("AI server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiService, ScriptedModel, MISSING_KEY_REPLY};
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn create_test_app(ai: AiService) -> Router {
        build_router(AppState::new(ai, Config::default()))
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_root_banner() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "GET", "/", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");
        assert_eq!(body["service"], "AI-ITS Orchestration Server");
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app(AiService::unconfigured());
        let (status, _) = send(app, "GET", "/health/live", "").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_reports_missing_key() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "GET", "/health", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["ai_configured"], false);
    }

    #[tokio::test]
    async fn test_chat_requires_message() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "POST", "/api/ai/chat", r#"{"context": "x"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message is required");
    }

    #[tokio::test]
    async fn test_chat_blank_message() {
        let app = create_test_app(AiService::unconfigured());
        let (status, _) = send(app, "POST", "/api/ai/chat", r#"{"message": "   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_without_key_returns_200() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "POST", "/api/ai/chat", r#"{"message": "hi"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], MISSING_KEY_REPLY);
    }

    #[tokio::test]
    async fn test_chat_with_model() {
        let model = ScriptedModel::replying("A loop repeats a block.");
        let app = create_test_app(AiService::new(model.clone()));
        let (status, body) = send(
            app,
            "POST",
            "/api/ai/chat",
            r#"{"message": "What is a loop?", "history": [{"role": "pesta", "content": "Hi!"}]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "A loop repeats a block.");
        assert_eq!(model.requests.lock().unwrap()[0].contents.len(), 4);
    }

    #[tokio::test]
    async fn test_diagnostic_requires_topic() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "POST", "/api/ai/diagnostic", "{}").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Topic is required");
    }

    #[tokio::test]
    async fn test_diagnostic_fallback_on_non_json() {
        let model = ScriptedModel::replying("Sure! Here are some questions...");
        let app = create_test_app(AiService::new(model));
        let (status, body) =
            send(app, "POST", "/api/ai/diagnostic", r#"{"topic": "Fractions"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["questions"][0]["question"],
            "Diagnostic generation failed. Mock Question 1?"
        );
    }

    #[tokio::test]
    async fn test_classify_parses_fenced_json() {
        let model = ScriptedModel::replying(
            "```json\n{\"level\": \"Advanced\", \"reason\": \"Strong scores\"}\n```",
        );
        let app = create_test_app(AiService::new(model));
        let (status, body) = send(
            app,
            "POST",
            "/api/ai/classify",
            r#"{"performance": {"score": 9, "total": 10}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["level"], "Advanced");
        assert_eq!(body["reason"], "Strong scores");
    }

    #[tokio::test]
    async fn test_classify_without_body_falls_back() {
        let app = create_test_app(AiService::unconfigured());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ai/classify")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["level"], "Beginner");
    }

    #[tokio::test]
    async fn test_classify_null_performance_reaches_model() {
        let model = ScriptedModel::replying(r#"{"level": "Intermediate", "reason": "No data"}"#);
        let app = create_test_app(AiService::new(model.clone()));
        let (status, body) = send(app, "POST", "/api/ai/classify", "  ").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["level"], "Intermediate");
        assert_eq!(model.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_classify_rejects_invalid_json() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "POST", "/api/ai/classify", "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_placement_without_key_uses_bank() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "POST", "/api/ai/placement", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["questions"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let app = create_test_app(AiService::unconfigured());
        let (status, body) = send(app, "POST", "/api/ai/chat", "not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    async fn allowed_origin(app: Router, origin: &str) -> Option<String> {
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origins() {
        let mut config = Config::default();
        config.server.cors_origins =
            vec!["http://localhost:5173".to_string(), "bad\norigin".to_string()];
        let app = build_router(AppState::new(AiService::unconfigured(), config));

        assert_eq!(
            allowed_origin(app.clone(), "http://localhost:5173").await.as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(allowed_origin(app, "http://evil.example").await, None);
    }

    #[tokio::test]
    async fn test_cors_permissive_without_origins() {
        let app = create_test_app(AiService::unconfigured());
        assert_eq!(
            allowed_origin(app, "http://anywhere.example").await.as_deref(),
            Some("*")
        );
    }
}
