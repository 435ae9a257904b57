//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Generative-language provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Provider API key; without it every AI call degrades to its fallback
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_output_tokens: u32,

    #[serde(default = "default_ai_timeout")]
    pub request_timeout_ms: u64,
}

fn default_model() -> String {
    "gemini-flash-latest".to_string()
}

fn default_ai_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_chat_max_tokens() -> u32 {
    500
}

fn default_ai_timeout() -> u64 {
    30_000
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_ai_base_url(),
            chat_max_output_tokens: default_chat_max_tokens(),
            request_timeout_ms: default_ai_timeout(),
        }
    }
}

impl AiConfig {
    /// Whether a non-empty API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Managed database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project URL of the managed database (e.g. "https://xyz.supabase.co")
    #[serde(default)]
    pub url: Option<String>,

    /// Public (anon) API key
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Access token of the signed-in user, if any
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_backend_timeout")]
    pub request_timeout_ms: u64,
}

fn default_backend_timeout() -> u64 {
    10_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            access_token: None,
            request_timeout_ms: default_backend_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Default `EnvFilter` directive derived from the configured level
    pub fn filter_directive(&self) -> String {
        format!("pesta={},tower_http=debug", self.level)
    }

    /// Whether logs should be emitted as JSON lines
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("pesta").join("config.toml")),
            Some(PathBuf::from("/etc/pesta/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(host) = lookup("PESTA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").or_else(|| lookup("PESTA_PORT")) {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        // AI overrides
        if let Some(key) = lookup("AI_API_KEY") {
            // Strip a leading BOM and surrounding whitespace
            let key = key.trim_start_matches('\u{feff}').trim().to_string();
            if !key.is_empty() {
                self.ai.api_key = Some(key);
            }
        }
        if let Some(model) = lookup("PESTA_AI_MODEL") {
            self.ai.model = model;
        }
        if let Some(url) = lookup("PESTA_AI_BASE_URL") {
            self.ai.base_url = url;
        }

        // Backend overrides
        if let Some(url) = lookup("SUPABASE_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Some(token) = lookup("SUPABASE_ACCESS_TOKEN") {
            self.backend.access_token = Some(token);
        }

        // Logging overrides
        if let Some(level) = lookup("PESTA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PESTA_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Pesta Configuration
#
# Environment variables override these settings:
# - PESTA_HOST, PORT
# - AI_API_KEY, PESTA_AI_MODEL, PESTA_AI_BASE_URL
# - SUPABASE_URL, SUPABASE_ANON_KEY, SUPABASE_ACCESS_TOKEN
# - PESTA_LOG_LEVEL, PESTA_LOG_FORMAT

[server]
# Proxy server host
host = "0.0.0.0"

# Proxy server port
port = 3001

# Allowed CORS origins (empty = allow any)
cors_origins = []

# Maximum request body size (bytes)
max_body_size = 1048576

[ai]
# Generative-language API key (prefer the AI_API_KEY environment variable)
# api_key = ""

# Model used for chat and quiz generation
model = "gemini-flash-latest"

# Provider base URL
base_url = "https://generativelanguage.googleapis.com"

# Maximum output tokens for tutor chat replies
chat_max_output_tokens = 500

# Upstream request timeout (ms)
request_timeout_ms = 30000

[backend]
# Managed database project URL
# url = "https://your-project.supabase.co"

# Public anon key
# anon_key = ""

# Request timeout (ms)
request_timeout_ms = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
