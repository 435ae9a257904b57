//! Classroom viewer
//!
//! Tracks a student's position in one course. Steps unlock strictly in order:
//! step `i + 1` opens only after step `i` is completed, and a step carrying a
//! quiz is completed only by answering it correctly. Progress lives for the
//! session only.

use std::collections::BTreeSet;

use crate::models::{CourseStep, QuizQuestion};

/// Outcome of trying to move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the step at this index
    Moved(usize),
    /// The current step is gated; a quiz is now open
    QuizRequired,
    /// Wrong answer; the quiz stays open
    Retry,
    /// The last step was completed
    CourseComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassroomError {
    #[error("Step {0} is locked")]
    Locked(usize),

    #[error("Step {0} does not exist")]
    OutOfRange(usize),

    #[error("No quiz is open")]
    NoQuizOpen,

    #[error("Course has no steps")]
    NoSteps,
}

/// An open quiz gate on the current step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    pub step: usize,
    pub attempts: u32,
    pub last_choice: Option<usize>,
}

/// Step progression for one course
#[derive(Debug, Clone)]
pub struct Classroom {
    steps: Vec<CourseStep>,
    current: usize,
    unlocked: BTreeSet<usize>,
    quiz: Option<QuizAttempt>,
}

impl Classroom {
    pub fn new(mut steps: Vec<CourseStep>) -> Self {
        steps.sort_by_key(|s| s.sequence_order);
        Self {
            steps,
            current: 0,
            unlocked: BTreeSet::from([0]),
            quiz: None,
        }
    }

    pub fn steps(&self) -> &[CourseStep] {
        &self.steps
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> Option<&CourseStep> {
        self.steps.get(self.current)
    }

    pub fn is_unlocked(&self, index: usize) -> bool {
        self.unlocked.contains(&index)
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.unlocked.contains(&(index + 1))
    }

    pub fn completed_count(&self) -> usize {
        self.unlocked.len() - 1
    }

    pub fn progress_percent(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let pct = self.completed_count().min(self.steps.len()) * 100 / self.steps.len();
        pct as u8
    }

    pub fn open_quiz(&self) -> Option<&QuizAttempt> {
        self.quiz.as_ref()
    }

    /// The quiz question of the open gate
    pub fn quiz_question(&self) -> Option<&QuizQuestion> {
        let attempt = self.quiz.as_ref()?;
        self.steps.get(attempt.step)?.quiz_data.as_ref()
    }

    /// Jump to an unlocked step
    pub fn select(&mut self, index: usize) -> Result<(), ClassroomError> {
        if index >= self.steps.len() {
            return Err(ClassroomError::OutOfRange(index));
        }
        if !self.is_unlocked(index) {
            return Err(ClassroomError::Locked(index));
        }
        self.current = index;
        self.quiz = None;
        Ok(())
    }

    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
        self.quiz = None;
    }

    /// "Next" on the current step
    pub fn advance(&mut self) -> Result<Advance, ClassroomError> {
        let step = self.current_step().ok_or(ClassroomError::NoSteps)?;
        if step.has_quiz() {
            self.quiz = Some(QuizAttempt {
                step: self.current,
                attempts: 0,
                last_choice: None,
            });
            return Ok(Advance::QuizRequired);
        }
        self.mark_complete()
    }

    /// Answer the open quiz
    pub fn submit_answer(&mut self, choice: usize) -> Result<Advance, ClassroomError> {
        let attempt = self.quiz.as_mut().ok_or(ClassroomError::NoQuizOpen)?;
        attempt.attempts += 1;
        attempt.last_choice = Some(choice);

        let correct = self
            .steps
            .get(attempt.step)
            .and_then(|s| s.quiz_data.as_ref())
            .is_some_and(|q| q.is_correct(choice));

        if correct {
            tracing::debug!(step = self.current, attempts = attempt.attempts, "Quiz passed");
            self.mark_complete()
        } else {
            Ok(Advance::Retry)
        }
    }

    /// Complete the current step and move on
    pub fn mark_complete(&mut self) -> Result<Advance, ClassroomError> {
        if self.steps.is_empty() {
            return Err(ClassroomError::NoSteps);
        }
        self.unlocked.insert(self.current + 1);
        self.quiz = None;

        if self.current + 1 < self.steps.len() {
            self.current += 1;
            Ok(Advance::Moved(self.current))
        } else {
            Ok(Advance::CourseComplete)
        }
    }

    pub fn close_quiz(&mut self) {
        self.quiz = None;
    }

    /// Context string sent to the tutor for the current step
    pub fn lesson_context(&self) -> Option<String> {
        self.current_step().map(lesson_context)
    }
}

/// Tutor context for a step
pub fn lesson_context(step: &CourseStep) -> String {
    format!(
        "Current Step: {}\nContent:\n{}",
        step.title,
        step.body.as_deref().unwrap_or("No text content")
    )
}
