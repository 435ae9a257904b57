//! AI Tutor Integration
//!
//! Connects the platform to an external generative-language API for tutor
//! chat replies and generated quiz content.
//!
//! ## Architecture
//!
//! - **Client**: REST client for the provider's `generateContent` endpoint
//! - **Prompts**: prompt templates and model-output cleanup
//! - **AiService**: chat / diagnostic / classify / placement with fallbacks
//!
//! ## Failure Model
//!
//! Every operation degrades to a fixed fallback (a user-visible string or a
//! hardcoded question set) instead of surfacing an error. There is no retry.

mod client;
pub mod prompts;
mod service;

pub use client::{
    GeminiClient, GenerateRequest, LanguageModel, ModelInfo, Turn, TurnRole,
};
pub use service::{
    diagnostic_fallback, placement_fallback, AiError, AiService, ChatTurn, Classification,
    CHAT_FALLBACK, MISSING_KEY_REPLY,
};

#[cfg(test)]
pub(crate) use service::tests::ScriptedModel;
