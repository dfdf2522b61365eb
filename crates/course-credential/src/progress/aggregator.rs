//! Course progress aggregation.
//!
//! Enrollment progress is never incremented. It is always derived from the
//! count of passing progress records against the course's lesson count, so
//! recomputing with unchanged records is a no-op.

use std::sync::Arc;

use log::debug;

use crate::course::{Course, CourseId};
use crate::error::{CredentialError, Result};
use crate::principal::{authenticated, LearnerId, Principal};
use crate::storage::{JsonStore, StoreState};
use crate::time::Clock;

use super::types::{Enrollment, ProgressRecord};

/// Percentage of lessons passed, rounded, capped at 100. A course without
/// lessons has zero progress.
pub fn course_progress(total_lessons: usize, passed_lessons: usize) -> u8 {
    if total_lessons == 0 {
        return 0;
    }
    let pct = (100.0 * passed_lessons as f64 / total_lessons as f64).round();
    pct.min(100.0) as u8
}

/// Recomputes enrollments from lesson progress records.
pub struct ProgressAggregator {
    store: Arc<JsonStore>,
    clock: Arc<dyn Clock>,
}

impl ProgressAggregator {
    pub fn new(store: Arc<JsonStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Recompute inside an open transaction.
    ///
    /// `updated_at` only moves when progress or completion actually changes.
    pub fn recompute_in(
        state: &mut StoreState,
        learner: &LearnerId,
        course_id: &CourseId,
        now: u64,
    ) -> Result<Enrollment> {
        let course = state
            .course_by_id(course_id)
            .ok_or_else(|| CredentialError::NotFound(format!("course {course_id}")))?;
        let progress = course_progress(course.lesson_count(), state.count_passed(learner, course));

        let mut enrollment = state
            .enrollment(learner, course_id)
            .cloned()
            .ok_or_else(|| {
                CredentialError::NotFound(format!("enrollment of {learner} in {course_id}"))
            })?;

        let completed = progress == 100;
        if enrollment.progress != progress || enrollment.completed != completed {
            debug!(
                "progress {learner} in {course_id}: {} -> {progress}",
                enrollment.progress
            );
            enrollment.progress = progress;
            enrollment.completed = completed;
            enrollment.updated_at = now;
            state.upsert_enrollment(enrollment.clone());
        }
        Ok(enrollment)
    }

    /// Recompute a learner's enrollment in a course.
    pub fn recompute(&self, learner: &LearnerId, course_id: &CourseId) -> Result<Enrollment> {
        let now = self.clock.now_micros();
        self.store
            .transaction(|state| Self::recompute_in(state, learner, course_id, now))
    }

    /// Enroll the principal in a course. Idempotent: an existing enrollment
    /// is recomputed and returned.
    pub fn enroll(&self, principal: Option<&Principal>, course_slug: &str) -> Result<Enrollment> {
        let principal = authenticated(principal)?;
        let learner = &principal.learner_id;
        let now = self.clock.now_micros();
        self.store.transaction(|state| {
            let course_id = course_for_slug(state, course_slug)?.id.clone();
            if state.enrollment(learner, &course_id).is_none() {
                state.upsert_enrollment(Enrollment::new(
                    learner.clone(),
                    course_id.clone(),
                    course_slug.to_string(),
                    now,
                ));
            }
            Self::recompute_in(state, learner, &course_id, now)
        })
    }

    /// The principal's enrollment and lesson records for a course.
    pub fn progress_report(
        &self,
        principal: Option<&Principal>,
        course_slug: &str,
    ) -> Result<(Enrollment, Vec<ProgressRecord>)> {
        let principal = authenticated(principal)?;
        let learner = &principal.learner_id;
        self.store.read(|state| {
            let course = course_for_slug(state, course_slug)?;
            let enrollment = state
                .enrollment(learner, &course.id)
                .cloned()
                .ok_or_else(|| {
                    CredentialError::NotFound(format!("enrollment of {learner} in {course_slug}"))
                })?;
            let records = course
                .lessons()
                .filter_map(|l| state.progress_for(learner, &l.id).cloned())
                .collect();
            Ok((enrollment, records))
        })?
    }
}

fn course_for_slug<'a>(state: &'a StoreState, slug: &str) -> Result<&'a Course> {
    state
        .course_by_slug(slug)
        .ok_or_else(|| CredentialError::NotFound(format!("course '{slug}'")))
}
