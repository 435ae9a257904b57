//! In-process backend
//!
//! Keeps the three tables in memory. Used by tests and by the CLI's offline
//! demo mode. Failure injection lets callers exercise rollback paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use super::changes::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, Table};
use super::{Backend, BackendError, BackendResult};
use crate::models::{
    AccountStatus, ContentItem, ContentPatch, ContentStatus, ContentType, CourseStep, NewContent,
    NewStep, Profile, ProfilePatch, QuizQuestion, Role, StepPatch,
};

/// Which calls an injected failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FailureMode {
    /// Every call succeeds
    None = 0,
    /// Inserts, updates and deletes fail
    Writes = 1,
    /// Every call fails
    All = 2,
}

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    content: Vec<ContentItem>,
    steps: Vec<CourseStep>,
    settings: HashMap<String, String>,
    next_content_id: i64,
    next_step_id: i64,
}

/// Backend holding its rows in memory
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    failure: AtomicU8,
    feed: ChangeFeed,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_content_id: 1,
                next_step_id: 1,
                ..Tables::default()
            }),
            failure: AtomicU8::new(FailureMode::None as u8),
            feed: ChangeFeed::default(),
        }
    }

    /// Builder method: seed profiles
    pub fn with_profiles(self, profiles: impl IntoIterator<Item = Profile>) -> Self {
        self.lock().profiles.extend(profiles);
        self
    }

    /// Builder method: seed content rows (ids are kept)
    pub fn with_content(self, items: impl IntoIterator<Item = ContentItem>) -> Self {
        {
            let mut tables = self.lock();
            for item in items {
                tables.next_content_id = tables.next_content_id.max(item.id + 1);
                tables.content.push(item);
            }
        }
        self
    }

    /// Builder method: seed course steps (ids are kept)
    pub fn with_steps(self, steps: impl IntoIterator<Item = CourseStep>) -> Self {
        {
            let mut tables = self.lock();
            for step in steps {
                tables.next_step_id = tables.next_step_id.max(step.id + 1);
                tables.steps.push(step);
            }
        }
        self
    }

    /// Builder method: set a `system_settings` value
    pub fn with_setting(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.lock().settings.insert(key.into(), value.into());
        self
    }

    /// Sample roster, catalog and one stepped course for offline use
    pub fn demo() -> Self {
        let students = [
            ("s-1", "Alice Johnson", "alice@example.com", AccountStatus::Active, 1250, &["Fast Learner", "Quiz Master"][..]),
            ("s-2", "Bob Smith", "bob@example.com", AccountStatus::Inactive, 450, &[][..]),
            ("s-3", "Charlie Brown", "charlie@example.com", AccountStatus::Active, 3100, &["Tech Wizard", "Helpful Peer", "Top Scorer"][..]),
            ("s-4", "Diana Prince", "diana@example.com", AccountStatus::Active, 2800, &["Top Scorer"][..]),
            ("s-5", "Evan Wright", "evan@example.com", AccountStatus::Active, 1500, &["Fast Learner"][..]),
        ];
        let profiles = students
            .into_iter()
            .map(|(id, name, email, status, points, badges)| {
                let mut profile = Profile::student(id, name).email(email).points(points);
                profile.status = status;
                profile.badges = badges.iter().map(|b| b.to_string()).collect();
                profile
            })
            .chain([Profile::student("t-1", "Ms. Rivera").role(Role::Teacher)]);

        let catalog = [
            (1, "Introduction to AI", ContentType::Video, ContentStatus::Published, "2023-10-01"),
            (2, "Neural Networks Basics", ContentType::Article, ContentStatus::Draft, "2023-10-05"),
            (3, "Machine Learning Quiz", ContentType::Quiz, ContentStatus::Published, "2023-10-10"),
            (4, "Advanced Python Algorithms", ContentType::Video, ContentStatus::Published, "2023-10-12"),
            (5, "Data Science Fundamentals", ContentType::Article, ContentStatus::Published, "2023-10-15"),
        ];
        let content = catalog
            .into_iter()
            .map(|(id, title, content_type, status, date)| ContentItem {
                id,
                title: title.to_string(),
                content_type,
                status,
                description: None,
                url: None,
                created_by: Some("t-1".to_string()),
                created_at: format!("{}T09:00:00Z", date).parse().ok(),
            });

        let steps = [
            CourseStep {
                id: 1,
                course_id: 1,
                title: "What is AI?".to_string(),
                body: Some("Artificial intelligence is the study of systems that perform tasks which normally need human judgement.".to_string()),
                quiz_data: None,
                sequence_order: 1,
            },
            CourseStep {
                id: 2,
                course_id: 1,
                title: "Learning from data".to_string(),
                body: Some("Machine learning systems improve at a task by finding patterns in examples.".to_string()),
                quiz_data: Some(QuizQuestion {
                    question: "What do machine learning systems learn from?".to_string(),
                    options: vec![
                        "Hand-written rules only".to_string(),
                        "Examples in data".to_string(),
                        "Random guesses".to_string(),
                    ],
                    answer: 1,
                }),
                sequence_order: 2,
            },
            CourseStep {
                id: 3,
                course_id: 1,
                title: "Where AI is used".to_string(),
                body: None,
                quiz_data: None,
                sequence_order: 3,
            },
        ];

        Self::new()
            .with_profiles(profiles)
            .with_content(content)
            .with_steps(steps)
            .with_setting("welcome_video_url", "https://www.youtube.com/embed/2ePf9rue1Ao")
    }

    /// Inject failures into subsequent calls
    pub fn set_failure(&self, mode: FailureMode) {
        self.failure.store(mode as u8, Ordering::SeqCst);
    }

    /// Snapshot of a stored profile, bypassing failure injection
    pub fn profile(&self, id: &str) -> Option<Profile> {
        self.lock().profiles.iter().find(|p| p.id == id).cloned()
    }

    /// Number of stored content rows
    pub fn content_len(&self) -> usize {
        self.lock().content.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock only means a test panicked mid-call
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_read(&self) -> BackendResult<()> {
        if self.failure.load(Ordering::SeqCst) == FailureMode::All as u8 {
            return Err(BackendError::Unavailable);
        }
        Ok(())
    }

    fn check_write(&self) -> BackendResult<()> {
        if self.failure.load(Ordering::SeqCst) != FailureMode::None as u8 {
            return Err(BackendError::Api {
                status: 503,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn emit(&self, table: Table, kind: ChangeKind, id: impl ToString) {
        self.feed.publish(ChangeEvent::new(table, kind, id));
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_profile(&self, id: &str) -> BackendResult<Option<Profile>> {
        self.check_read()?;
        Ok(self.profile(id))
    }

    async fn list_students(&self) -> BackendResult<Vec<Profile>> {
        self.check_read()?;
        let mut students: Vec<Profile> = self
            .lock()
            .profiles
            .iter()
            .filter(|p| p.role == Role::Student)
            .cloned()
            .collect();
        // Nulls sort last, as PostgREST does for ascending order
        students.sort_by(|a, b| {
            (a.full_name.is_none(), &a.full_name).cmp(&(b.full_name.is_none(), &b.full_name))
        });
        Ok(students)
    }

    async fn insert_profile(&self, profile: &Profile) -> BackendResult<Profile> {
        self.check_write()?;
        {
            let mut tables = self.lock();
            if tables.profiles.iter().any(|p| p.id == profile.id) {
                return Err(BackendError::Conflict(format!("profile {}", profile.id)));
            }
            tables.profiles.push(profile.clone());
        }
        self.emit(Table::Profiles, ChangeKind::Insert, &profile.id);
        Ok(profile.clone())
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> BackendResult<()> {
        self.check_write()?;
        {
            let mut tables = self.lock();
            let profile = tables
                .profiles
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("profile {}", id)))?;
            profile.apply(patch);
        }
        self.emit(Table::Profiles, ChangeKind::Update, id);
        Ok(())
    }

    async fn list_content(&self) -> BackendResult<Vec<ContentItem>> {
        self.check_read()?;
        let mut items = self.lock().content.clone();
        items.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(items)
    }

    async fn insert_content(&self, item: &NewContent) -> BackendResult<ContentItem> {
        self.check_write()?;
        let stored = {
            let mut tables = self.lock();
            let id = tables.next_content_id;
            tables.next_content_id += 1;
            let stored = ContentItem {
                id,
                title: item.title.clone(),
                content_type: item.content_type.clone(),
                status: item.status,
                description: item.description.clone(),
                url: item.url.clone(),
                created_by: item.created_by.clone(),
                created_at: Some(Utc::now()),
            };
            tables.content.push(stored.clone());
            stored
        };
        self.emit(Table::Content, ChangeKind::Insert, stored.id);
        Ok(stored)
    }

    async fn update_content(&self, id: i64, patch: &ContentPatch) -> BackendResult<()> {
        self.check_write()?;
        {
            let mut tables = self.lock();
            let item = tables
                .content
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("content {}", id)))?;
            item.apply(patch);
        }
        self.emit(Table::Content, ChangeKind::Update, id);
        Ok(())
    }

    async fn delete_content(&self, id: i64) -> BackendResult<()> {
        self.check_write()?;
        {
            let mut tables = self.lock();
            tables.content.retain(|c| c.id != id);
            // Steps cascade with their course
            tables.steps.retain(|s| s.course_id != id);
        }
        self.emit(Table::Content, ChangeKind::Delete, id);
        Ok(())
    }

    async fn list_steps(&self, course_id: i64) -> BackendResult<Vec<CourseStep>> {
        self.check_read()?;
        let mut steps: Vec<CourseStep> = self
            .lock()
            .steps
            .iter()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.sequence_order, s.id));
        Ok(steps)
    }

    async fn insert_step(&self, step: &NewStep) -> BackendResult<CourseStep> {
        self.check_write()?;
        let stored = {
            let mut tables = self.lock();
            if !tables.content.iter().any(|c| c.id == step.course_id) {
                return Err(BackendError::Conflict(format!(
                    "course {} does not exist",
                    step.course_id
                )));
            }
            let id = tables.next_step_id;
            tables.next_step_id += 1;
            let stored = CourseStep {
                id,
                course_id: step.course_id,
                title: step.title.clone(),
                body: step.body.clone(),
                quiz_data: step.quiz_data.clone(),
                sequence_order: step.sequence_order,
            };
            tables.steps.push(stored.clone());
            stored
        };
        self.emit(Table::CourseSteps, ChangeKind::Insert, stored.id);
        Ok(stored)
    }

    async fn update_step(&self, id: i64, patch: &StepPatch) -> BackendResult<CourseStep> {
        self.check_write()?;
        let stored = {
            let mut tables = self.lock();
            let step = tables
                .steps
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("course step {}", id)))?;
            step.apply(patch);
            step.clone()
        };
        self.emit(Table::CourseSteps, ChangeKind::Update, id);
        Ok(stored)
    }

    async fn delete_step(&self, id: i64) -> BackendResult<()> {
        self.check_write()?;
        self.lock().steps.retain(|s| s.id != id);
        self.emit(Table::CourseSteps, ChangeKind::Delete, id);
        Ok(())
    }

    async fn fetch_setting(&self, key: &str) -> BackendResult<Option<String>> {
        self.check_read()?;
        Ok(self.lock().settings.get(key).cloned())
    }

    fn changes(&self) -> ChangeSubscription {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FeedMessage;

    fn course(id: i64, title: &str) -> ContentItem {
        ContentItem {
            id,
            title: title.to_string(),
            content_type: ContentType::Article,
            status: ContentStatus::Published,
            description: None,
            url: None,
            created_by: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_demo_seed() {
        let backend = MemoryBackend::demo();
        assert_eq!(backend.list_students().await.unwrap().len(), 5);

        let content = backend.list_content().await.unwrap();
        assert_eq!(content[0].title, "Data Science Fundamentals");

        let steps = backend.list_steps(1).await.unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps[1].has_quiz());

        assert!(backend
            .fetch_setting("welcome_video_url")
            .await
            .unwrap()
            .is_some());
        assert_eq!(backend.fetch_setting("missing").await.unwrap(), None);

        let next = backend
            .insert_content(&NewContent::new("Fresh", ContentType::Video))
            .await
            .unwrap();
        assert_eq!(next.id, 6);
    }

    #[tokio::test]
    async fn test_students_sorted_by_name() {
        let backend = MemoryBackend::new().with_profiles([
            Profile::student("2", "Charlie Brown"),
            Profile::student("1", "Alice Johnson"),
            Profile::student("3", "Ms. Smith").role(Role::Teacher),
        ]);

        let students = backend.list_students().await.unwrap();
        let names: Vec<&str> = students.iter().map(|s| s.display_name()).collect();
        assert_eq!(names, vec!["Alice Johnson", "Charlie Brown"]);
    }

    #[tokio::test]
    async fn test_content_newest_first() {
        let backend = MemoryBackend::new();
        backend
            .insert_content(&NewContent::new("First", ContentType::Video))
            .await
            .unwrap();
        backend
            .insert_content(&NewContent::new("Second", ContentType::Quiz))
            .await
            .unwrap();

        let items = backend.list_content().await.unwrap();
        assert_eq!(items[0].title, "Second");
        assert_eq!(items[1].title, "First");
    }

    #[tokio::test]
    async fn test_steps_ordered_and_updated() {
        let backend = MemoryBackend::new().with_content([course(10, "Rust")]);
        for (order, title) in [(2, "Borrowing"), (1, "Ownership")] {
            backend
                .insert_step(&NewStep {
                    course_id: 10,
                    title: title.to_string(),
                    body: None,
                    quiz_data: None,
                    sequence_order: order,
                })
                .await
                .unwrap();
        }

        let steps = backend.list_steps(10).await.unwrap();
        assert_eq!(steps[0].title, "Ownership");

        let quiz = QuizQuestion {
            question: "Who owns a value?".to_string(),
            options: vec!["One owner".to_string(), "Everyone".to_string()],
            answer: 0,
        };
        let updated = backend
            .update_step(
                steps[0].id,
                &StepPatch {
                    quiz_data: Some(Some(quiz.clone())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.quiz_data, Some(quiz));
    }

    #[tokio::test]
    async fn test_step_requires_existing_course() {
        let backend = MemoryBackend::new();
        let result = backend
            .insert_step(&NewStep {
                course_id: 99,
                title: "Orphan".to_string(),
                body: None,
                quiz_data: None,
                sequence_order: 1,
            })
            .await;
        assert!(matches!(result, Err(BackendError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = MemoryBackend::new().with_content([course(1, "Intro")]);

        backend.set_failure(FailureMode::Writes);
        assert!(backend.list_content().await.is_ok());
        assert!(backend.delete_content(1).await.is_err());
        assert_eq!(backend.content_len(), 1);

        backend.set_failure(FailureMode::All);
        assert!(matches!(
            backend.list_content().await,
            Err(BackendError::Unavailable)
        ));

        backend.set_failure(FailureMode::None);
        backend.delete_content(1).await.unwrap();
        assert_eq!(backend.content_len(), 0);
    }

    #[tokio::test]
    async fn test_mutations_emit_changes() {
        let backend = MemoryBackend::new().with_profiles([Profile::student("u-1", "Alice")]);
        let mut sub = backend.changes();

        backend
            .update_profile(
                "u-1",
                &ProfilePatch {
                    has_seen_welcome: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            sub.recv().await,
            Some(FeedMessage::Change(ChangeEvent::new(
                Table::Profiles,
                ChangeKind::Update,
                "u-1"
            )))
        );
        assert!(backend.profile("u-1").unwrap().has_seen_welcome);
    }
}
