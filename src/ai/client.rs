//! Generative-language REST Client
//!
//! HTTP client for the provider's `generateContent` and `models` endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::service::AiError;
use crate::config::AiConfig;

/// Anything that can turn a conversation into a text completion
///
/// The production implementation is [`GeminiClient`]; tests script replies.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logging and health output
    fn model_name(&self) -> &str;

    /// Generate a completion for the given conversation
    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError>;
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One turn of a conversation sent upstream
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub contents: Vec<Turn>,
    pub max_output_tokens: Option<u32>,
}

impl GenerateRequest {
    /// Single-shot prompt with no history
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            contents: vec![Turn::user(text)],
            max_output_tokens: None,
        }
    }

    /// Builder method: cap the reply length
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// Model metadata returned by the provider's listing endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Fully qualified name, e.g. "models/gemini-1.5-flash"
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Name without the "models/" prefix
    pub fn short_name(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    /// Whether the model can be used with `generateContent`
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

/// REST client for the Gemini generative-language API
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client from configuration
    ///
    /// Returns `AiError::MissingApiKey` when no key is configured.
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AiError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(AiError::Request)?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Same client pointed at another model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            model: model.into(),
            base_url: self.base_url.clone(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// List models visible to this API key
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, AiError> {
        let url = format!("{}/v1beta/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let listing: ListModelsResponse = response.json().await.map_err(AiError::Request)?;
        Ok(listing.models)
    }

    /// Send a tiny prompt to check that the model answers
    pub async fn ping(&self) -> Result<(), AiError> {
        self.generate(GenerateRequest::prompt("Hello")).await.map(|_| ())
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError> {
        let body = GenerateContentBody::from(&request);

        tracing::debug!(
            model = %self.model,
            turns = body.contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.generate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let result: GenerateContentResponse =
            response.json().await.map_err(AiError::Request)?;

        result.text().ok_or(AiError::EmptyResponse)
    }
}

fn map_transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else if e.is_connect() {
        AiError::Unavailable
    } else {
        AiError::Request(e)
    }
}

async fn api_error(response: reqwest::Response) -> AiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|e| e.error.message)
        .unwrap_or(text);
    AiError::Api { status, message }
}

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl From<&GenerateRequest> for GenerateContentBody {
    fn from(request: &GenerateRequest) -> Self {
        Self {
            contents: request
                .contents
                .iter()
                .map(|turn| Content {
                    role: Some(turn.role),
                    parts: vec![Part {
                        text: Some(turn.text.clone()),
                    }],
                })
                .collect(),
            generation_config: request.max_output_tokens.map(|max| GenerationConfig {
                max_output_tokens: max,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<TurnRole>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
