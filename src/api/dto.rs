//! Data Transfer Objects
//!
//! Request and response types for the proxy endpoints.
//! Request fields are optional so a missing field becomes a 400 with a
//! readable message instead of a deserialization failure.

use serde::{Deserialize, Serialize};

use crate::ai::ChatTurn;
use crate::models::QuizQuestion;

// ============================================
// CHAT
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Text of the lesson the student is looking at
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

// ============================================
// QUIZ GENERATION
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticRequest {
    #[serde(default)]
    pub topic: Option<String>,
}

/// Response of the diagnostic and placement endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassifyRequest {
    /// Free-form performance record, passed to the model as JSON
    #[serde(default)]
    pub performance: serde_json::Value,
}

// ============================================
// HEALTH
// ============================================

/// Response of `GET /`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Response of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" with a provider key, "degraded" without
    pub status: String,
    pub ai_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub uptime_seconds: u64,
    pub version: String,
}
