//! # Pesta
//!
//! AI-assisted learning platform: an AI tutor proxy server plus the state
//! containers behind the teacher console and the student portal.
//!
//! ## Features
//!
//! - **AI tutor proxy**: chat, diagnostic tests, classification and placement
//!   questions over a generative-language API, with fixed fallbacks
//! - **Classroom**: ordered course steps unlocked one at a time, quiz gated
//! - **Data store**: optimistic content authoring over a managed database,
//!   refreshed from a row change feed
//! - **Gamification**: points leaderboard, badges, class analytics
//!
//! ## Modules
//!
//! - [`models`]: Rows of the managed database
//! - [`ai`]: Provider client, prompts and the fallback-producing service
//! - [`api`]: Proxy HTTP server with Axum
//! - [`backend`]: Managed database access (REST and in-memory)
//! - [`store`]: Cached console/portal state with rollback
//! - [`classroom`]: Step unlock state machine
//! - [`placement`]: Placement test flow and scoring
//! - [`gamification`]: Leaderboard and badges
//! - [`tutor`]: Tutor chat transcript and proxy client
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pesta::backend::MemoryBackend;
//! use pesta::classroom::{Advance, Classroom};
//! use pesta::store::DataStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DataStore::new(Arc::new(MemoryBackend::demo()));
//!     store.load_session("s-1").await;
//!
//!     let mut room = Classroom::new(store.fetch_steps(1).await);
//!     if room.advance()? == Advance::QuizRequired {
//!         room.submit_answer(1)?;
//!     }
//!     println!("{}% complete", room.progress_percent());
//!
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod api;
pub mod backend;
pub mod classroom;
pub mod config;
pub mod gamification;
pub mod models;
pub mod placement;
pub mod store;
pub mod tutor;

// Re-export top-level types for convenience
pub use models::{
    AccountStatus, ContentItem, ContentPatch, ContentStatus, ContentType, CourseStep,
    LearningLevel, NewContent, NewStep, Preferences, Profile, ProfilePatch, QuizQuestion, Role,
    StepPatch,
};

pub use ai::{AiError, AiService, ChatTurn, Classification, GeminiClient, LanguageModel};

pub use api::{build_router, serve, ApiError, AppState};

pub use backend::{
    AuthClient, AuthSession, Backend, BackendError, BackendResult, ChangeEvent, ChangeFeed,
    ChangeKind, MemoryBackend, RealtimeListener, RestBackend, Table,
};

pub use store::{DataStore, StoreError, StoreResult};

pub use classroom::{Advance, Classroom, ClassroomError};

pub use placement::{needs_placement, score_placement, PlacementResult, PlacementTest};

pub use gamification::{Badge, ClassAnalytics};

pub use tutor::{ProxyClient, TutorApi, TutorSession};

pub use config::{Config, ConfigError, LoggingConfig};
