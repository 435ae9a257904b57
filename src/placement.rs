//! Placement test
//!
//! A short logic assessment shown to new students after the welcome video.
//! The score is mapped locally to a [`LearningLevel`]; the AI classifier is
//! not consulted.

use serde::{Deserialize, Serialize};

use crate::models::{LearningLevel, Profile, QuizQuestion};

/// Correct answers needed for Advanced
pub const ADVANCED_THRESHOLD: usize = 8;

/// Correct answers needed for Intermediate
pub const INTERMEDIATE_THRESHOLD: usize = 5;

/// Whether the placement test should be offered
pub fn needs_placement(profile: &Profile) -> bool {
    profile.has_seen_welcome && !profile.has_taken_placement_test
}

/// Outcome of a placement test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub level: LearningLevel,
    pub reason: String,
    pub score: usize,
}

/// Map a number of correct answers to a level
pub fn score_placement(correct: usize) -> PlacementResult {
    let (level, reason) = if correct >= ADVANCED_THRESHOLD {
        (
            LearningLevel::Advanced,
            "Excellent logical and reasoning skills!",
        )
    } else if correct >= INTERMEDIATE_THRESHOLD {
        (
            LearningLevel::Intermediate,
            "Good understanding, ready for standard coursework.",
        )
    } else {
        (
            LearningLevel::Beginner,
            "Keep practicing to build your foundation.",
        )
    };

    PlacementResult {
        level,
        reason: reason.to_string(),
        score: correct,
    }
}

/// Screen of the placement flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Intro,
    Test,
    Result(PlacementResult),
}

/// Errors from driving the test out of order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("No questions to ask")]
    NoQuestions,

    #[error("Test is not in progress")]
    NotInProgress,

    #[error("Option {choice} out of range for question {question}")]
    InvalidChoice { question: usize, choice: usize },

    #[error("Question {0} has not been answered")]
    Unanswered(usize),
}

/// Placement test state machine: Intro, then Test, then Result
#[derive(Debug, Clone)]
pub struct PlacementTest {
    phase: Phase,
    questions: Vec<QuizQuestion>,
    answers: Vec<Option<usize>>,
    current: usize,
}

impl Default for PlacementTest {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementTest {
    pub fn new() -> Self {
        Self {
            phase: Phase::Intro,
            questions: Vec::new(),
            answers: Vec::new(),
            current: 0,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Start the test with the fetched questions
    ///
    /// An empty list keeps the test on the intro screen.
    pub fn begin(&mut self, questions: Vec<QuizQuestion>) -> Result<(), PlacementError> {
        if questions.is_empty() {
            return Err(PlacementError::NoQuestions);
        }
        self.answers = vec![None; questions.len()];
        self.questions = questions;
        self.current = 0;
        self.phase = Phase::Test;
        Ok(())
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        match self.phase {
            Phase::Test => self.questions.get(self.current),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_last_question(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    /// Select an option for the current question; may be changed until `next`
    pub fn answer(&mut self, choice: usize) -> Result<(), PlacementError> {
        let question = self
            .current_question()
            .ok_or(PlacementError::NotInProgress)?;
        if choice >= question.options.len() {
            return Err(PlacementError::InvalidChoice {
                question: self.current,
                choice,
            });
        }
        self.answers[self.current] = Some(choice);
        Ok(())
    }

    /// Move to the next question, or finish after the last one
    pub fn next(&mut self) -> Result<Option<PlacementResult>, PlacementError> {
        if self.phase != Phase::Test {
            return Err(PlacementError::NotInProgress);
        }
        if self.answers[self.current].is_none() {
            return Err(PlacementError::Unanswered(self.current));
        }
        if self.is_last_question() {
            return self.finish().map(Some);
        }
        self.current += 1;
        Ok(None)
    }

    pub fn correct_count(&self) -> usize {
        self.questions
            .iter()
            .zip(&self.answers)
            .filter(|(q, a)| a.is_some_and(|choice| q.is_correct(choice)))
            .count()
    }

    /// Score the answers and move to the result screen
    ///
    /// Unanswered questions count as wrong.
    pub fn finish(&mut self) -> Result<PlacementResult, PlacementError> {
        if self.phase != Phase::Test {
            return Err(PlacementError::NotInProgress);
        }
        let result = score_placement(self.correct_count());
        tracing::info!(score = result.score, level = %result.level, "Placement test finished");
        self.phase = Phase::Result(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::placement_fallback;

    #[test]
    fn test_thresholds() {
        assert_eq!(score_placement(10).level, LearningLevel::Advanced);
        assert_eq!(score_placement(8).level, LearningLevel::Advanced);
        assert_eq!(score_placement(7).level, LearningLevel::Intermediate);
        assert_eq!(score_placement(5).level, LearningLevel::Intermediate);
        assert_eq!(score_placement(4).level, LearningLevel::Beginner);
        assert_eq!(
            score_placement(0).reason,
            "Keep practicing to build your foundation."
        );
    }

    #[test]
    fn test_needs_placement() {
        let mut profile = Profile::student("u-1", "Alice");
        assert!(!needs_placement(&profile));

        profile.has_seen_welcome = true;
        assert!(needs_placement(&profile));

        profile.has_taken_placement_test = true;
        assert!(!needs_placement(&profile));
    }

    #[test]
    fn test_full_run_all_correct() {
        let questions = placement_fallback();
        let answers: Vec<usize> = questions.iter().map(|q| q.answer).collect();

        let mut test = PlacementTest::new();
        test.begin(questions).unwrap();

        let mut result = None;
        for choice in answers {
            test.answer(choice).unwrap();
            result = test.next().unwrap();
        }

        let result = result.unwrap();
        assert_eq!(result.score, 10);
        assert_eq!(result.level, LearningLevel::Advanced);
        assert!(matches!(test.phase(), Phase::Result(_)));
    }

    #[test]
    fn test_next_requires_answer() {
        let mut test = PlacementTest::new();
        test.begin(placement_fallback()).unwrap();
        assert_eq!(test.next(), Err(PlacementError::Unanswered(0)));

        test.answer(0).unwrap();
        assert_eq!(test.next(), Ok(None));
        assert_eq!(test.current_index(), 1);
    }

    #[test]
    fn test_begin_rejects_empty() {
        let mut test = PlacementTest::new();
        assert_eq!(test.begin(Vec::new()), Err(PlacementError::NoQuestions));
        assert_eq!(test.phase(), &Phase::Intro);
        assert_eq!(test.answer(0), Err(PlacementError::NotInProgress));
    }

    #[test]
    fn test_early_finish_counts_unanswered_as_wrong() {
        let questions = placement_fallback();
        let first = questions[0].answer;

        let mut test = PlacementTest::new();
        test.begin(questions).unwrap();
        test.answer(first).unwrap();

        let result = test.finish().unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.level, LearningLevel::Beginner);
    }
}
