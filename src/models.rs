//! Core data types for the learning platform
//!
//! These mirror the rows of the managed database:
//! - `Profile`: a student or teacher account with gamification state
//! - `ContentItem`: a course or standalone piece of content
//! - `CourseStep`: one page of a course, optionally gated by a quiz
//!
//! Insert and patch types serialize only the fields that are set so they can
//! be sent as-is to the REST backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Profiles
// ============================================

/// Account role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Teacher => write!(f, "teacher"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Roster status shown in the admin console
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
}

impl AccountStatus {
    /// The opposite status
    pub fn toggled(self) -> Self {
        match self {
            AccountStatus::Active => AccountStatus::Inactive,
            AccountStatus::Inactive => AccountStatus::Active,
        }
    }
}

/// Coarse skill tier assigned by the placement test
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum LearningLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for LearningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearningLevel::Beginner => write!(f, "Beginner"),
            LearningLevel::Intermediate => write!(f, "Intermediate"),
            LearningLevel::Advanced => write!(f, "Advanced"),
        }
    }
}

impl std::str::FromStr for LearningLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(LearningLevel::Beginner),
            "intermediate" => Ok(LearningLevel::Intermediate),
            "advanced" => Ok(LearningLevel::Advanced),
            _ => Err(format!("Invalid learning level: {}", s)),
        }
    }
}

/// Learner preferences used for recommendations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_learning_style")]
    pub learning_style: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default = "default_weekly_goal")]
    pub weekly_goal_hours: u32,
}

fn default_learning_style() -> String {
    "Video".to_string()
}

fn default_weekly_goal() -> u32 {
    5
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            learning_style: default_learning_style(),
            interests: Vec::new(),
            weekly_goal_hours: default_weekly_goal(),
        }
    }
}

/// A row of the `profiles` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
    #[serde(default)]
    pub learning_level: Option<LearningLevel>,
    #[serde(default)]
    pub has_seen_welcome: bool,
    #[serde(default)]
    pub has_taken_placement_test: bool,
}

impl Profile {
    /// Create a student profile with defaults
    pub fn student(id: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: Some(full_name.into()),
            email: None,
            role: Role::Student,
            status: AccountStatus::Active,
            points: 0,
            badges: Vec::new(),
            preferences: None,
            learning_level: None,
            has_seen_welcome: false,
            has_taken_placement_test: false,
        }
    }

    /// Placeholder used when an authenticated user has no profile row yet
    pub fn placeholder(id: impl Into<String>) -> Self {
        let mut profile = Self::student(id, "New User");
        profile.preferences = Some(Preferences::default());
        profile
    }

    /// Builder method: set points
    pub fn points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }

    /// Builder method: add a badge
    pub fn badge(mut self, badge: impl Into<String>) -> Self {
        self.badges.push(badge.into());
        self
    }

    /// Builder method: set the role
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Builder method: set the email
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name to show in lists
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Student")
    }

    /// First word of the display name, for greetings
    pub fn first_name(&self) -> &str {
        self.display_name()
            .split_whitespace()
            .next()
            .unwrap_or("Student")
    }

    /// Preferences with defaults filled in
    pub fn preferences_or_default(&self) -> Preferences {
        self.preferences.clone().unwrap_or_default()
    }

    /// Learning level, defaulting to Beginner before placement
    pub fn level_or_default(&self) -> LearningLevel {
        self.learning_level.unwrap_or(LearningLevel::Beginner)
    }

    /// Merge a patch into this profile
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(name) = &patch.full_name {
            self.full_name = Some(name.clone());
        }
        if let Some(prefs) = &patch.preferences {
            self.preferences = Some(prefs.clone());
        }
        if let Some(level) = patch.learning_level {
            self.learning_level = Some(level);
        }
        if let Some(seen) = patch.has_seen_welcome {
            self.has_seen_welcome = seen;
        }
        if let Some(taken) = patch.has_taken_placement_test {
            self.has_taken_placement_test = taken;
        }
        if let Some(points) = patch.points {
            self.points = points;
        }
        if let Some(badges) = &patch.badges {
            self.badges = badges.clone();
        }
    }
}

/// Partial update of a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_level: Option<LearningLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_seen_welcome: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_taken_placement_test: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badges: Option<Vec<String>>,
}

// ============================================
// Content
// ============================================

/// Kind of content item
///
/// Unknown values coming from the database are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    Video,
    Article,
    Quiz,
    Other(String),
}

impl From<String> for ContentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Video" => ContentType::Video,
            "Article" => ContentType::Article,
            "Quiz" => ContentType::Quiz,
            _ => ContentType::Other(s),
        }
    }
}

impl From<ContentType> for String {
    fn from(t: ContentType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Video => write!(f, "Video"),
            ContentType::Article => write!(f, "Article"),
            ContentType::Quiz => write!(f, "Quiz"),
            ContentType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Publication status of a content item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
}

/// A row of the `content` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Whether students can see this item in the catalog
    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }

    /// Merge a patch into this item
    pub fn apply(&mut self, patch: &ContentPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(t) = &patch.content_type {
            self.content_type = t.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(desc) = &patch.description {
            self.description = Some(desc.clone());
        }
        if let Some(url) = &patch.url {
            self.url = Some(url.clone());
        }
    }
}

/// Content authored in the console before it has a database id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewContent {
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl NewContent {
    pub fn new(title: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            title: title.into(),
            content_type,
            status: ContentStatus::Draft,
            description: None,
            url: None,
            created_by: None,
        }
    }

    /// Builder method: set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update of a content item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================
// Course steps
// ============================================

/// Single multiple-choice question (step gate or generated quiz item)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Index of the correct option
    #[serde(alias = "correctIndex")]
    pub answer: usize,
}

impl QuizQuestion {
    /// Exact index match against the stored answer
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.answer
    }
}

/// A row of the `course_steps` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseStep {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub quiz_data: Option<QuizQuestion>,
    #[serde(default)]
    pub sequence_order: i32,
}

impl CourseStep {
    /// Whether advancing past this step requires a quiz
    pub fn has_quiz(&self) -> bool {
        self.quiz_data.is_some()
    }

    /// Merge a patch into this step
    pub fn apply(&mut self, patch: &StepPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(body) = &patch.body {
            self.body = Some(body.clone());
        }
        if let Some(quiz) = &patch.quiz_data {
            self.quiz_data = quiz.clone();
        }
        if let Some(order) = patch.sequence_order {
            self.sequence_order = order;
        }
    }
}

/// Step authored in the course builder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewStep {
    pub course_id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_data: Option<QuizQuestion>,
    pub sequence_order: i32,
}

/// Partial update of a step
///
/// `quiz_data: Some(None)` clears the quiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_data: Option<Option<QuizQuestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_from_sparse_row() {
        let json = r#"{"id": "u-1", "full_name": "Alice Johnson"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.role, Role::Student);
        assert_eq!(profile.points, 0);
        assert!(profile.badges.is_empty());
        assert_eq!(profile.preferences_or_default().learning_style, "Video");
        assert_eq!(profile.level_or_default(), LearningLevel::Beginner);
    }

    #[test]
    fn test_profile_name_alias_and_display() {
        let json = r#"{"id": "u-2", "name": "Charlie Brown"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.display_name(), "Charlie Brown");
        assert_eq!(profile.first_name(), "Charlie");

        let anonymous = Profile {
            full_name: None,
            ..profile
        };
        assert_eq!(anonymous.display_name(), "Student");
    }

    #[test]
    fn test_content_type_preserves_unknown() {
        let item: ContentItem =
            serde_json::from_str(r#"{"id": 1, "title": "Slides", "type": "Slideshow"}"#).unwrap();
        assert_eq!(item.content_type, ContentType::Other("Slideshow".to_string()));
        assert_eq!(item.status, ContentStatus::Draft);

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"type\":\"Slideshow\""));
    }

    #[test]
    fn test_step_quiz_accepts_correct_index_key() {
        let json = r#"{"question": "2+2?", "options": ["3", "4"], "correctIndex": 1}"#;
        let quiz: QuizQuestion = serde_json::from_str(json).unwrap();
        assert!(quiz.is_correct(1));
        assert!(!quiz.is_correct(0));
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = ContentPatch {
            status: Some(ContentStatus::Published),
            ..Default::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"status":"Published"}"#);
    }

    #[test]
    fn test_profile_apply_patch() {
        let mut profile = Profile::student("u-3", "Diana Prince");
        profile.apply(&ProfilePatch {
            learning_level: Some(LearningLevel::Advanced),
            has_taken_placement_test: Some(true),
            ..Default::default()
        });
        assert_eq!(profile.learning_level, Some(LearningLevel::Advanced));
        assert!(profile.has_taken_placement_test);
        assert_eq!(profile.display_name(), "Diana Prince");
    }

    #[test]
    fn test_learning_level_parse() {
        assert_eq!("advanced".parse::<LearningLevel>(), Ok(LearningLevel::Advanced));
        assert!("expert".parse::<LearningLevel>().is_err());
        assert_eq!(" Teacher".parse::<Role>(), Ok(Role::Teacher));
        assert!("admin".parse::<Role>().is_err());
    }
}
