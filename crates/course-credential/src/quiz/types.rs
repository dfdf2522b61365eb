//! Data structures for quiz attempts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::certificate::Issuance;
use crate::course::{CourseId, LessonId, QuestionId};
use crate::principal::LearnerId;

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

/// Unique identifier for an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub String);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One graded submission of a lesson's quiz.
///
/// Immutable once written, except that `locked_until` is set on the attempt
/// that triggers a cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: AttemptId,
    pub learner_id: LearnerId,
    pub lesson_id: LessonId,
    pub course_id: CourseId,
    /// 0-100.
    pub score: u8,
    pub is_passed: bool,
    /// 1-based, monotonically increasing per (learner, lesson).
    pub attempt_no: u32,
    /// Submissions are refused until this time (microseconds).
    pub locked_until: Option<u64>,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Submission and result
// ---------------------------------------------------------------------------

/// A learner's answers for one lesson quiz: question id → selected option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub lesson_id: LessonId,
    pub answers: BTreeMap<QuestionId, u32>,
}

impl QuizSubmission {
    pub fn new(lesson_id: LessonId) -> Self {
        Self {
            lesson_id,
            answers: BTreeMap::new(),
        }
    }

    /// Add an answer, returning the updated submission.
    pub fn answer(mut self, question: impl Into<String>, option: u32) -> Self {
        self.answers.insert(QuestionId(question.into()), option);
        self
    }
}

/// Score for a set of answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub correct: u32,
    pub total: u32,
    pub score: u8,
    pub is_passed: bool,
}

/// Where a learner stands before a new submission is graded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// The submission may be graded.
    Eligible {
        /// Attempts already recorded for this (learner, lesson).
        prior_attempts: u32,
        /// Unlocked failures since the last served cooldown, including none.
        failures_in_window: u32,
    },
    /// A passing attempt exists; nothing more is graded.
    AlreadyPassed,
    /// An active cooldown lock.
    Locked { until: u64 },
    /// The attempt budget is spent but no lock was written yet; the most
    /// recent attempt must be locked.
    Exhausted { lock_attempt: AttemptId },
}

/// Outcome of a graded submission.
#[derive(Debug)]
pub struct QuizResult {
    pub score: u8,
    pub is_passed: bool,
    pub attempt_no: u32,
    /// Set when this failure exhausted the attempt budget.
    pub locked_until: Option<u64>,
    /// Course progress after recomputation (passing submissions only).
    pub course_progress: Option<u8>,
    /// Certificate issuance triggered by reaching 100% progress.
    pub issuance: Option<Issuance>,
}
