//! Managed Database Access
//!
//! All durable application data lives in an external backend-as-a-service.
//! This module consumes it through the [`Backend`] trait:
//!
//! - [`RestBackend`]: PostgREST-style REST API over HTTP
//! - [`MemoryBackend`]: in-process tables for tests and offline demos
//!
//! Both publish row changes on a [`ChangeFeed`] so cached views can refetch.
//! [`RealtimeListener`] feeds changes made by other clients into the same
//! feed, and [`AuthClient`] signs users in to obtain an access token.

mod auth;
mod changes;
mod memory;
mod realtime;
mod rest;

pub use changes::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, FeedMessage, Table,
};
pub use auth::{AuthClient, AuthSession, AuthUser};
pub use memory::{FailureMode, MemoryBackend};
pub use realtime::{parse_change, RealtimeListener};
pub use rest::RestBackend;

use async_trait::async_trait;

use crate::models::{
    ContentItem, ContentPatch, CourseStep, NewContent, NewStep, Profile, ProfilePatch, StepPatch,
};

/// Access to the `profiles`, `content` and `course_steps` tables
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch one profile by id
    async fn fetch_profile(&self, id: &str) -> BackendResult<Option<Profile>>;

    /// Student profiles ordered by full name
    async fn list_students(&self) -> BackendResult<Vec<Profile>>;

    /// Create a profile row
    async fn insert_profile(&self, profile: &Profile) -> BackendResult<Profile>;

    /// Partially update a profile
    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> BackendResult<()>;

    /// All content, newest first
    async fn list_content(&self) -> BackendResult<Vec<ContentItem>>;

    /// Insert a content item and return the stored row
    async fn insert_content(&self, item: &NewContent) -> BackendResult<ContentItem>;

    async fn update_content(&self, id: i64, patch: &ContentPatch) -> BackendResult<()>;

    async fn delete_content(&self, id: i64) -> BackendResult<()>;

    /// Steps of a course ordered by `sequence_order`
    async fn list_steps(&self, course_id: i64) -> BackendResult<Vec<CourseStep>>;

    async fn insert_step(&self, step: &NewStep) -> BackendResult<CourseStep>;

    async fn update_step(&self, id: i64, patch: &StepPatch) -> BackendResult<CourseStep>;

    async fn delete_step(&self, id: i64) -> BackendResult<()>;

    /// Value of a `system_settings` row, None when the key is unset
    async fn fetch_setting(&self, key: &str) -> BackendResult<Option<String>>;

    /// Subscribe to row changes
    fn changes(&self) -> ChangeSubscription;
}

/// Errors returned by a backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Backend unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Realtime connection error: {0}")]
    Realtime(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
