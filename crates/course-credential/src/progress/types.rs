//! Data structures for lesson progress and course enrollment.

use serde::{Deserialize, Serialize};

use crate::course::{CourseId, LessonId};
use crate::principal::LearnerId;

/// Latest grading outcome for one (learner, lesson). Upserted, never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub learner_id: LearnerId,
    pub lesson_id: LessonId,
    pub course_id: CourseId,
    pub score: u8,
    pub is_passed: bool,
    pub completed_at: u64,
}

/// A learner's standing in a course, derived entirely from progress records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub learner_id: LearnerId,
    pub course_id: CourseId,
    pub course_slug: String,
    /// 0-100.
    pub progress: u8,
    pub completed: bool,
    pub enrolled_at: u64,
    pub updated_at: u64,
}

impl Enrollment {
    /// A fresh enrollment with no progress.
    pub fn new(learner_id: LearnerId, course_id: CourseId, course_slug: String, now: u64) -> Self {
        Self {
            learner_id,
            course_id,
            course_slug,
            progress: 0,
            completed: false,
            enrolled_at: now,
            updated_at: now,
        }
    }
}
