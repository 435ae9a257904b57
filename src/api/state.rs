//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::ai::AiService;
use crate::config::Config;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Tutor and quiz generation
    pub ai: AiService,
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(ai: AiService, config: Config) -> Self {
        Self {
            ai,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Build the AI service from configuration
    pub fn from_config(config: Config) -> Self {
        let ai = AiService::from_config(&config.ai);
        Self::new(ai, config)
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
