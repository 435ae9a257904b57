//! AI Service
//!
//! Tutor chat, diagnostic test generation, student classification and the
//! placement assessment. Each operation returns a usable value even when the
//! provider is missing or misbehaves.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::client::{GeminiClient, GenerateRequest, LanguageModel, Turn};
use super::prompts;
use crate::config::AiConfig;
use crate::models::QuizQuestion;

/// Reply when the server has no provider key
pub const MISSING_KEY_REPLY: &str = "AI Configuration Error: API Key missing on server.";

/// Reply when the provider call fails
pub const CHAT_FALLBACK: &str =
    "I'm having trouble connecting to my brain right now. Please try again later.";

/// One entry of the flattened chat history sent by the portal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    /// "pesta" for tutor turns, anything else is treated as the student
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Whether this turn was produced by the tutor
    pub fn is_tutor(&self) -> bool {
        matches!(self.role.as_str(), "pesta" | "model" | "bot")
    }

    fn to_turn(&self) -> Turn {
        if self.is_tutor() {
            Turn::model(self.content.clone())
        } else {
            Turn::user(self.content.clone())
        }
    }
}

/// Result of classifying a student's performance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub level: String,
    pub reason: String,
}

impl Classification {
    /// Returned whenever classification cannot be produced
    pub fn fallback() -> Self {
        Self {
            level: "Beginner".to_string(),
            reason: "Fallback due to AI error.".to_string(),
        }
    }
}

/// Errors raised while talking to the provider
///
/// These never leave [`AiService`]; they are logged and replaced by fallbacks.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("API key missing")]
    MissingApiKey,

    #[error("Provider unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Unparseable model output: {0}")]
    Parse(String),
}

/// Tutor and quiz generation on top of a [`LanguageModel`]
#[derive(Clone)]
pub struct AiService {
    model: Option<Arc<dyn LanguageModel>>,
    chat_max_output_tokens: u32,
}

impl AiService {
    /// Create a service backed by the given model
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model: Some(model),
            chat_max_output_tokens: 500,
        }
    }

    /// Create a service with no provider; every call returns its fallback
    pub fn unconfigured() -> Self {
        Self {
            model: None,
            chat_max_output_tokens: 500,
        }
    }

    /// Build from configuration, falling back to unconfigured without a key
    pub fn from_config(config: &AiConfig) -> Self {
        let service = match GeminiClient::new(config) {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "AI provider not configured, serving fallbacks");
                Self::unconfigured()
            }
        };
        service.chat_max_output_tokens(config.chat_max_output_tokens)
    }

    /// Builder method: cap chat reply length
    pub fn chat_max_output_tokens(mut self, tokens: u32) -> Self {
        self.chat_max_output_tokens = tokens;
        self
    }

    /// Whether a provider is configured
    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Name of the configured model, if any
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.model_name())
    }

    fn model(&self) -> Result<&Arc<dyn LanguageModel>, AiError> {
        self.model.as_ref().ok_or(AiError::MissingApiKey)
    }

    /// Build the full conversation for a chat message
    pub fn chat_request(
        &self,
        message: &str,
        context: Option<&str>,
        history: &[ChatTurn],
    ) -> GenerateRequest {
        let mut contents = Vec::with_capacity(history.len() + 3);
        contents.push(Turn::user(prompts::chat_preamble(context)));
        contents.push(Turn::model(prompts::PRIMING_ACK));
        contents.extend(history.iter().map(ChatTurn::to_turn));
        contents.push(Turn::user(message));

        GenerateRequest {
            contents,
            ..Default::default()
        }
        .max_output_tokens(self.chat_max_output_tokens)
    }

    /// Answer a student's message in the context of the current lesson
    pub async fn chat(&self, message: &str, context: Option<&str>, history: &[ChatTurn]) -> String {
        let model = match self.model() {
            Ok(model) => model,
            Err(_) => return MISSING_KEY_REPLY.to_string(),
        };

        let request = self.chat_request(message, context, history);
        match model.generate(request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "AI service error (chat)");
                CHAT_FALLBACK.to_string()
            }
        }
    }

    /// Generate a diagnostic pre-test for a topic
    pub async fn diagnostic(&self, topic: &str) -> Vec<QuizQuestion> {
        match self.try_diagnostic(topic).await {
            Ok(questions) => questions,
            Err(e) => {
                tracing::error!(error = %e, topic = %topic, "AI service error (diagnostic)");
                diagnostic_fallback()
            }
        }
    }

    async fn try_diagnostic(&self, topic: &str) -> Result<Vec<QuizQuestion>, AiError> {
        let text = self
            .model()?
            .generate(GenerateRequest::prompt(prompts::diagnostic_prompt(topic)))
            .await?;
        parse_json(&text)
    }

    /// Classify a student from an arbitrary performance payload
    pub async fn classify(&self, performance: &serde_json::Value) -> Classification {
        match self.try_classify(performance).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::error!(error = %e, "AI service error (classify)");
                Classification::fallback()
            }
        }
    }

    async fn try_classify(&self, performance: &serde_json::Value) -> Result<Classification, AiError> {
        let text = self
            .model()?
            .generate(GenerateRequest::prompt(prompts::classify_prompt(performance)))
            .await?;
        parse_json(&text)
    }

    /// Generate the placement assessment
    pub async fn placement(&self) -> Vec<QuizQuestion> {
        match self.try_placement().await {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!(error = %e, "Placement generation failed, using built-in bank");
                placement_fallback()
            }
        }
    }

    async fn try_placement(&self) -> Result<Vec<QuizQuestion>, AiError> {
        let text = self
            .model()?
            .generate(GenerateRequest::prompt(prompts::placement_prompt(
                prompts::PLACEMENT_QUESTION_COUNT,
            )))
            .await?;
        let questions: Vec<QuizQuestion> = parse_json(&text)?;
        if questions.is_empty() {
            return Err(AiError::Parse("empty question list".to_string()));
        }
        Ok(questions)
    }
}

/// Strip markdown fences and parse the remainder as JSON
fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let clean = prompts::strip_code_fences(text);
    serde_json::from_str(&clean).map_err(|e| AiError::Parse(e.to_string()))
}

/// Returned whenever diagnostic generation fails
pub fn diagnostic_fallback() -> Vec<QuizQuestion> {
    vec![QuizQuestion {
        question: "Diagnostic generation failed. Mock Question 1?".to_string(),
        options: vec!["Yes".to_string(), "No".to_string()],
        answer: 0,
    }]
}

/// Built-in logic assessment used when the provider cannot generate one
pub fn placement_fallback() -> Vec<QuizQuestion> {
    const BANK: [(&str, [&str; 4], usize); 10] = [
        ("What comes next: 2, 4, 8, 16, ...?", ["18", "24", "32", "64"], 2),
        ("If all cats are animals and some animals are black, which must be true?", ["All cats are black", "Some cats are black", "Cats are animals", "No cats are black"], 2),
        ("Which word does not belong: apple, banana, carrot, grape?", ["apple", "banana", "carrot", "grape"], 2),
        ("A train travels 60 km in 1 hour. How far does it go in 2.5 hours?", ["120 km", "150 km", "160 km", "180 km"], 1),
        ("What comes next: A, C, F, J, ...?", ["M", "N", "O", "P"], 2),
        ("If today is Monday, what day is it 10 days from now?", ["Wednesday", "Thursday", "Friday", "Saturday"], 1),
        ("Book is to reading as fork is to ...?", ["drawing", "writing", "eating", "stirring"], 2),
        ("Which number is the odd one out: 3, 5, 9, 11, 13?", ["3", "5", "9", "13"], 2),
        ("Five machines make five widgets in five minutes. How long do 100 machines take to make 100 widgets?", ["1 minute", "5 minutes", "20 minutes", "100 minutes"], 1),
        ("If some blips are blops and all blops are bleeps, which must be true?", ["All blips are bleeps", "Some blips are bleeps", "No blips are bleeps", "All bleeps are blips"], 1),
    ];

    BANK.iter()
        .map(|(question, options, answer)| QuizQuestion {
            question: question.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            answer: *answer,
        })
        .collect()
}
