//! Data Store
//!
//! Client-side cache of the current user, the student roster and the content
//! catalog, backed by a [`Backend`]. This is the state shared by the teacher
//! console and the student portal.
//!
//! ## Update Model
//!
//! Content mutations are optimistic: the cache changes first, the backend call
//! follows, and a failed call puts back the row it touched and returns
//! [`StoreError::Rejected`]. Roster edits are local to the console session.
//! A background watcher refetches cached lists when the change feed reports
//! a row change.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::backend::{Backend, BackendError, FeedMessage, Table};
use crate::gamification::{self, ClassAnalytics};
use crate::models::{
    AccountStatus, ContentItem, ContentPatch, ContentStatus, CourseStep, NewContent, NewStep,
    Profile, ProfilePatch, QuizQuestion, StepPatch,
};
use crate::placement::PlacementResult;

/// `system_settings` key of the welcome video URL
pub const WELCOME_VIDEO_KEY: &str = "welcome_video_url";

/// Errors surfaced to the console and portal
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A mutation failed and the cache was rolled back
    #[error("Failed to {action}: {source}")]
    Rejected {
        action: &'static str,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("No user session")]
    NoSession,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Cached application data over a backend
pub struct DataStore<B: Backend> {
    backend: Arc<B>,
    current_user: RwLock<Option<Profile>>,
    students: RwLock<Vec<Profile>>,
    content: RwLock<Vec<ContentItem>>,
    next_temp_id: AtomicI64,
}

impl<B: Backend + 'static> DataStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            current_user: RwLock::new(None),
            students: RwLock::new(Vec::new()),
            content: RwLock::new(Vec::new()),
            next_temp_id: AtomicI64::new(-1),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // ============================================
    // Session
    // ============================================

    /// Load the signed-in user's profile
    ///
    /// A missing or unreadable profile yields a placeholder so the portal can
    /// render while the row is being created.
    pub async fn load_session(&self, user_id: &str) -> Profile {
        let profile = match self.backend.fetch_profile(user_id).await {
            Ok(Some(mut profile)) => {
                if profile.preferences.is_none() {
                    profile.preferences = Some(Default::default());
                }
                profile
            }
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "Profile not found, using placeholder");
                Profile::placeholder(user_id)
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Error fetching profile");
                Profile::placeholder(user_id)
            }
        };

        *self.current_user.write().await = Some(profile.clone());
        profile
    }

    /// Forget the signed-in user
    pub async fn end_session(&self) {
        *self.current_user.write().await = None;
    }

    pub async fn current_user(&self) -> Option<Profile> {
        self.current_user.read().await.clone()
    }

    /// Create the profile row for a new account and make it current
    pub async fn create_profile(&self, profile: Profile) -> StoreResult<Profile> {
        let stored = self.backend.insert_profile(&profile).await?;
        *self.current_user.write().await = Some(stored.clone());
        Ok(stored)
    }

    /// Refetch content, newest first; the cache is kept on error
    pub async fn refresh_content(&self) -> StoreResult<()> {
        match self.backend.list_content().await {
            Ok(items) => {
                *self.content.write().await = items;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching content");
                Err(e.into())
            }
        }
    }

    /// Refetch the student roster; the cache is kept on error
    pub async fn refresh_students(&self) -> StoreResult<()> {
        match self.backend.list_students().await {
            Ok(students) => {
                *self.students.write().await = students;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching students");
                Err(e.into())
            }
        }
    }

    /// Spawn a task that refetches cached lists on row changes
    ///
    /// The subscription is taken before this returns, so changes made after
    /// the call are never missed. The task ends when the feed closes.
    pub fn watch(self: Arc<Self>) -> JoinHandle<()> {
        let mut changes = self
            .backend
            .changes()
            .topics([Table::Profiles.name(), Table::Content.name()]);

        tokio::spawn(async move {
            tracing::debug!("Watching row changes");
            while let Some(message) = changes.recv().await {
                let result = match message {
                    FeedMessage::Change(event) if event.table == Table::Profiles => {
                        self.refresh_students().await
                    }
                    FeedMessage::Change(_) => self.refresh_content().await,
                    FeedMessage::Resync => match self.refresh_students().await {
                        Ok(()) => self.refresh_content().await,
                        Err(e) => Err(e),
                    },
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Refetch after row change failed");
                }
            }
            tracing::debug!("Change feed closed");
        })
    }

    // ============================================
    // Content
    // ============================================

    pub async fn content(&self) -> Vec<ContentItem> {
        self.content.read().await.clone()
    }

    /// Author a content item
    ///
    /// A Draft placeholder with a temporary negative id is shown immediately.
    /// The row is stored as Published; on success the placeholder is replaced
    /// by the stored row, on failure it is removed.
    pub async fn add_content(&self, new: NewContent) -> StoreResult<ContentItem> {
        let temp_id = self.next_temp_id.fetch_sub(1, Ordering::Relaxed);
        let optimistic = ContentItem {
            id: temp_id,
            title: new.title.clone(),
            content_type: new.content_type.clone(),
            status: ContentStatus::Draft,
            description: new.description.clone(),
            url: new.url.clone(),
            created_by: None,
            created_at: Some(Utc::now()),
        };
        self.content.write().await.insert(0, optimistic);

        let created_by = self.current_user.read().await.as_ref().map(|u| u.id.clone());
        let insert = NewContent {
            status: ContentStatus::Published,
            created_by,
            ..new
        };

        let result = self.backend.insert_content(&insert).await;

        let mut content = self.content.write().await;
        match result {
            Ok(stored) => {
                tracing::info!(id = stored.id, title = %stored.title, "Content added");
                // A refetch triggered by the insert may already hold the row
                content.retain(|c| c.id != temp_id && c.id != stored.id);
                content.insert(0, stored.clone());
                Ok(stored)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error adding content");
                content.retain(|c| c.id != temp_id);
                Err(StoreError::Rejected {
                    action: "save content",
                    source: e,
                })
            }
        }
    }

    /// Apply a patch to a content item
    ///
    /// On failure only that item is restored; other cache changes made while
    /// the call was in flight are kept.
    pub async fn update_content(&self, id: i64, patch: ContentPatch) -> StoreResult<()> {
        let previous = {
            let mut content = self.content.write().await;
            content.iter_mut().find(|c| c.id == id).map(|item| {
                let previous = item.clone();
                item.apply(&patch);
                previous
            })
        };

        if let Err(e) = self.backend.update_content(id, &patch).await {
            tracing::error!(id, error = %e, "Error updating content");
            if let Some(previous) = previous {
                let mut content = self.content.write().await;
                if let Some(item) = content.iter_mut().find(|c| c.id == id) {
                    *item = previous;
                }
            }
            return Err(StoreError::Rejected {
                action: "update content",
                source: e,
            });
        }
        Ok(())
    }

    /// Delete a content item, putting it back in place on failure
    pub async fn remove_content(&self, id: i64) -> StoreResult<()> {
        let removed = {
            let mut content = self.content.write().await;
            let index = content.iter().position(|c| c.id == id);
            index.map(|index| (index, content.remove(index)))
        };

        if let Err(e) = self.backend.delete_content(id).await {
            tracing::error!(id, error = %e, "Error deleting content");
            if let Some((index, item)) = removed {
                let mut content = self.content.write().await;
                if !content.iter().any(|c| c.id == id) {
                    let index = index.min(content.len());
                    content.insert(index, item);
                }
            }
            return Err(StoreError::Rejected {
                action: "delete content",
                source: e,
            });
        }
        Ok(())
    }

    // ============================================
    // Roster (console session only)
    // ============================================

    pub async fn students(&self) -> Vec<Profile> {
        self.students.read().await.clone()
    }

    /// Add a student to the local roster
    pub async fn add_student(&self, full_name: &str, email: &str) -> Profile {
        let student = Profile::student(uuid::Uuid::new_v4().to_string(), full_name).email(email);
        self.students.write().await.push(student.clone());
        student
    }

    /// Remove a student from the local roster; returns whether one was removed
    pub async fn remove_student(&self, id: &str) -> bool {
        let mut students = self.students.write().await;
        let before = students.len();
        students.retain(|s| s.id != id);
        students.len() != before
    }

    /// Flip a student between Active and Inactive; returns the new status
    pub async fn toggle_student_status(&self, id: &str) -> Option<AccountStatus> {
        let mut students = self.students.write().await;
        let student = students.iter_mut().find(|s| s.id == id)?;
        student.status = student.status.toggled();
        Some(student.status)
    }

    // ============================================
    // Course steps
    // ============================================

    /// Steps of a course in order; failures are logged and yield no steps
    pub async fn fetch_steps(&self, course_id: i64) -> Vec<CourseStep> {
        match self.backend.list_steps(course_id).await {
            Ok(steps) => steps,
            Err(e) => {
                tracing::error!(course_id, error = %e, "Error fetching steps");
                Vec::new()
            }
        }
    }

    /// Append a step after the existing ones
    pub async fn add_step(
        &self,
        course_id: i64,
        title: &str,
        body: Option<String>,
        quiz: Option<QuizQuestion>,
    ) -> StoreResult<CourseStep> {
        let existing = self.backend.list_steps(course_id).await?.len();
        let step = NewStep {
            course_id,
            title: title.to_string(),
            body,
            quiz_data: quiz,
            sequence_order: existing as i32 + 1,
        };
        Ok(self.backend.insert_step(&step).await?)
    }

    pub async fn update_step(&self, id: i64, patch: StepPatch) -> StoreResult<CourseStep> {
        Ok(self.backend.update_step(id, &patch).await?)
    }

    pub async fn delete_step(&self, id: i64) -> StoreResult<()> {
        Ok(self.backend.delete_step(id).await?)
    }

    // ============================================
    // Current user
    // ============================================

    /// Merge fields into the current user without persisting them
    pub async fn update_user(&self, patch: &ProfilePatch) {
        if let Some(user) = self.current_user.write().await.as_mut() {
            user.apply(patch);
        }
    }

    /// Record that the welcome video was watched
    ///
    /// The local flag is set first and kept even if persisting fails.
    pub async fn mark_welcome_seen(&self) -> StoreResult<()> {
        let patch = ProfilePatch {
            has_seen_welcome: Some(true),
            ..Default::default()
        };
        let id = {
            let mut guard = self.current_user.write().await;
            let user = guard.as_mut().ok_or(StoreError::NoSession)?;
            user.apply(&patch);
            user.id.clone()
        };

        self.backend.update_profile(&id, &patch).await.map_err(|e| {
            tracing::error!(user_id = %id, error = %e, "Error saving welcome flag");
            StoreError::from(e)
        })
    }

    /// URL of the welcome video, when the current user has not watched it yet
    ///
    /// Lookup failures are logged and treated as no video.
    pub async fn welcome_video(&self) -> Option<String> {
        let user = self.current_user().await?;
        if user.has_seen_welcome {
            return None;
        }

        match self.backend.fetch_setting(WELCOME_VIDEO_KEY).await {
            Ok(url) => url.filter(|u| !u.trim().is_empty()),
            Err(e) => {
                tracing::error!(error = %e, "Error fetching welcome video");
                None
            }
        }
    }

    /// Persist a placement outcome, then merge it locally
    pub async fn record_placement(&self, result: &PlacementResult) -> StoreResult<()> {
        let id = self
            .current_user
            .read()
            .await
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or(StoreError::NoSession)?;

        let patch = ProfilePatch {
            learning_level: Some(result.level),
            has_taken_placement_test: Some(true),
            ..Default::default()
        };
        if let Err(e) = self.backend.update_profile(&id, &patch).await {
            tracing::error!(user_id = %id, error = %e, "Error saving placement");
            return Err(e.into());
        }

        tracing::info!(user_id = %id, level = %result.level, "Placement recorded");
        self.update_user(&patch).await;
        Ok(())
    }

    // ============================================
    // Queries
    // ============================================

    /// Published items whose title contains `search` (case-insensitive)
    pub async fn published_catalog(&self, search: &str) -> Vec<ContentItem> {
        let needle = search.to_lowercase();
        self.content
            .read()
            .await
            .iter()
            .filter(|c| c.is_published() && c.title.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// All items whose title contains `term` (case-insensitive)
    pub async fn search_content(&self, term: &str) -> Vec<ContentItem> {
        let needle = term.to_lowercase();
        self.content
            .read()
            .await
            .iter()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Students whose name or email contains `term` (case-insensitive)
    pub async fn search_students(&self, term: &str) -> Vec<Profile> {
        let needle = term.to_lowercase();
        self.students
            .read()
            .await
            .iter()
            .filter(|s| {
                s.display_name().to_lowercase().contains(&needle)
                    || s.email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Published items matching the current user's learning style or interests
    pub async fn recommendations(&self) -> Vec<ContentItem> {
        let Some(user) = self.current_user().await else {
            return Vec::new();
        };
        let prefs = user.preferences_or_default();

        self.content
            .read()
            .await
            .iter()
            .filter(|c| {
                c.is_published()
                    && (c.content_type.to_string() == prefs.learning_style
                        || prefs.interests.iter().any(|i| c.title.contains(i.as_str())))
            })
            .cloned()
            .collect()
    }

    pub async fn leaderboard(&self) -> Vec<Profile> {
        gamification::leaderboard(&self.students.read().await)
    }

    pub async fn analytics(&self) -> ClassAnalytics {
        ClassAnalytics::compute(&self.students.read().await)
    }
}
