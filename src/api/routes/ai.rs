//! AI Routes
//!
//! Thin HTTP wrappers around [`AiService`](crate::ai::AiService).
//!
//! - POST /api/ai/chat - Tutor reply
//! - POST /api/ai/diagnostic - Generated pre-test for a topic
//! - POST /api/ai/classify - Level classification
//! - POST /api/ai/placement - Placement assessment

use axum::{body::Bytes, extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;

use crate::ai::Classification;
use crate::api::dto::{
    ChatRequest, ChatResponse, ClassifyRequest, DiagnosticRequest, QuestionsResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Reject absent or blank required fields
fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(message.to_string()))
}

/// POST /api/ai/chat
///
/// Upstream failures are reported in the reply text, never as an HTTP error.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(req) = payload?;
    let message = required(req.message, "Message is required")?;

    tracing::debug!(
        history_len = req.history.len(),
        has_context = req.context.is_some(),
        "Chat request"
    );

    let response = state
        .ai
        .chat(&message, req.context.as_deref(), &req.history)
        .await;

    Ok(Json(ChatResponse { response }))
}

/// POST /api/ai/diagnostic
pub async fn diagnostic(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DiagnosticRequest>, JsonRejection>,
) -> ApiResult<Json<QuestionsResponse>> {
    let Json(req) = payload?;
    let topic = required(req.topic, "Topic is required")?;

    let questions = state.ai.diagnostic(&topic).await;
    Ok(Json(QuestionsResponse { questions }))
}

/// POST /api/ai/classify
///
/// An empty body, with or without a Content-Type, means `performance: null`.
pub async fn classify(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<Classification>> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        ClassifyRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidJson(e.to_string()))?
    };
    Ok(Json(state.ai.classify(&req.performance).await))
}

/// POST /api/ai/placement
///
/// Any request body is ignored.
pub async fn placement(State(state): State<Arc<AppState>>) -> Json<QuestionsResponse> {
    let questions = state.ai.placement().await;
    Json(QuestionsResponse { questions })
}
