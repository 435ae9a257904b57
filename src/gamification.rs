//! Points, badges and leaderboards

use serde::{Deserialize, Serialize};

use crate::models::{AccountStatus, Profile};

/// Number of students shown in the analytics top list
pub const TOP_PERFORMERS: usize = 5;

/// Badges shown inline before collapsing into "+N"
pub const BADGES_SHOWN: usize = 3;

/// Achievement badge
///
/// Badge names are free text in the database; unknown names are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Badge {
    FastLearner,
    QuizMaster,
    TechWizard,
    HelpfulPeer,
    TopScorer,
    Other(String),
}

/// Display tier of a badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTier {
    Gold,
    Purple,
    Blue,
    Green,
    Red,
    Plain,
}

impl Badge {
    pub fn parse(name: &str) -> Self {
        match name {
            "Fast Learner" => Badge::FastLearner,
            "Quiz Master" => Badge::QuizMaster,
            "Tech Wizard" => Badge::TechWizard,
            "Helpful Peer" => Badge::HelpfulPeer,
            "Top Scorer" => Badge::TopScorer,
            other => Badge::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Badge::FastLearner => "Fast Learner",
            Badge::QuizMaster => "Quiz Master",
            Badge::TechWizard => "Tech Wizard",
            Badge::HelpfulPeer => "Helpful Peer",
            Badge::TopScorer => "Top Scorer",
            Badge::Other(name) => name,
        }
    }

    pub fn tier(&self) -> BadgeTier {
        match self {
            Badge::FastLearner => BadgeTier::Gold,
            Badge::QuizMaster => BadgeTier::Purple,
            Badge::TechWizard => BadgeTier::Blue,
            Badge::HelpfulPeer => BadgeTier::Green,
            Badge::TopScorer => BadgeTier::Red,
            Badge::Other(_) => BadgeTier::Plain,
        }
    }
}

impl std::fmt::Display for Badge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed badges of a profile
pub fn badges_of(profile: &Profile) -> Vec<Badge> {
    profile.badges.iter().map(|b| Badge::parse(b)).collect()
}

/// Badges to render inline plus the number hidden behind "+N"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeSummary {
    pub shown: Vec<Badge>,
    pub overflow: usize,
}

pub fn badge_summary(profile: &Profile) -> BadgeSummary {
    let badges = badges_of(profile);
    let overflow = badges.len().saturating_sub(BADGES_SHOWN);
    BadgeSummary {
        shown: badges.into_iter().take(BADGES_SHOWN).collect(),
        overflow,
    }
}

/// Students ordered by points, highest first
///
/// Ties keep their input order.
pub fn leaderboard(students: &[Profile]) -> Vec<Profile> {
    let mut ranked = students.to_vec();
    ranked.sort_by(|a, b| b.points.cmp(&a.points));
    ranked
}

/// 1-based leaderboard position of a student
pub fn rank_of(students: &[Profile], id: &str) -> Option<usize> {
    leaderboard(students)
        .iter()
        .position(|p| p.id == id)
        .map(|i| i + 1)
}

pub fn top_performers(students: &[Profile], n: usize) -> Vec<Profile> {
    let mut ranked = leaderboard(students);
    ranked.truncate(n);
    ranked
}

/// Figures shown on the console's analytics view
#[derive(Debug, Clone, Serialize)]
pub struct ClassAnalytics {
    pub total_students: usize,
    pub active_students: usize,
    pub total_points: u64,
    pub top_performers: Vec<Profile>,
}

impl ClassAnalytics {
    pub fn compute(students: &[Profile]) -> Self {
        Self {
            total_students: students.len(),
            active_students: students
                .iter()
                .filter(|s| s.status == AccountStatus::Active)
                .count(),
            total_points: students.iter().map(|s| u64::from(s.points)).sum(),
            top_performers: top_performers(students, TOP_PERFORMERS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Profile> {
        vec![
            Profile::student("a", "Alice").points(120),
            Profile::student("b", "Bob").points(300),
            Profile::student("c", "Cara").points(120),
            Profile::student("d", "Dan").points(40),
        ]
    }

    #[test]
    fn test_leaderboard_is_stable() {
        let ids: Vec<String> = leaderboard(&roster()).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_rank_of() {
        let students = roster();
        assert_eq!(rank_of(&students, "b"), Some(1));
        assert_eq!(rank_of(&students, "c"), Some(3));
        assert_eq!(rank_of(&students, "zzz"), None);
    }

    #[test]
    fn test_badge_parsing() {
        assert_eq!(Badge::parse("Quiz Master"), Badge::QuizMaster);
        assert_eq!(Badge::parse("Quiz Master").tier(), BadgeTier::Purple);
        let custom = Badge::parse("Night Owl");
        assert_eq!(custom.name(), "Night Owl");
        assert_eq!(custom.tier(), BadgeTier::Plain);
    }

    #[test]
    fn test_badge_summary_overflow() {
        let profile = Profile::student("a", "Alice")
            .badge("Fast Learner")
            .badge("Quiz Master")
            .badge("Tech Wizard")
            .badge("Helpful Peer")
            .badge("Top Scorer");
        let summary = badge_summary(&profile);
        assert_eq!(summary.shown.len(), 3);
        assert_eq!(summary.overflow, 2);

        let none = badge_summary(&Profile::student("b", "Bob"));
        assert!(none.shown.is_empty());
        assert_eq!(none.overflow, 0);
    }

    #[test]
    fn test_class_analytics() {
        let mut students = roster();
        students[3].status = AccountStatus::Inactive;

        let analytics = ClassAnalytics::compute(&students);
        assert_eq!(analytics.total_students, 4);
        assert_eq!(analytics.active_students, 3);
        assert_eq!(analytics.total_points, 580);
        assert_eq!(analytics.top_performers.len(), 4);
        assert_eq!(analytics.top_performers[0].id, "b");
    }
}
