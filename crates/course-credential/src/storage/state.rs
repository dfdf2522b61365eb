//! The persisted relational model.
//!
//! Every entity of the pipeline lives here, keyed the way the pipeline looks
//! it up. Composite keys (`learner::lesson`, `learner::course`,
//! `student::slug`) make the uniqueness rules structural: a progress record,
//! an enrollment or a certificate owner slot can only exist once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::certificate::{Certificate, CertificateId, PlatformPolicy};
use crate::course::{Course, CourseId, Lesson, LessonId};
use crate::error::{CredentialError, Result};
use crate::principal::LearnerId;
use crate::progress::{Enrollment, ProgressRecord};
use crate::quiz::{AttemptId, QuizAttempt};

fn pair_key(a: &str, b: &str) -> String {
    format!("{a}::{b}")
}

/// All persisted pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    /// Catalog, keyed by course slug.
    pub courses: BTreeMap<String, Course>,
    /// Append-only attempt log.
    pub attempts: Vec<QuizAttempt>,
    /// Keyed by `learner::lesson`.
    pub progress: BTreeMap<String, ProgressRecord>,
    /// Keyed by `learner::course_id`.
    pub enrollments: BTreeMap<String, Enrollment>,
    pub certificates: BTreeMap<CertificateId, Certificate>,
    /// Unique owner index, keyed by `student::course_slug`.
    pub certificate_owners: BTreeMap<String, CertificateId>,
    pub policy: PlatformPolicy,
}

impl StoreState {
    // ── Catalog ───────────────────────────────────────────────────────────────

    /// Insert or replace a course. Lesson ids must be unique across the catalog.
    pub fn upsert_course(&mut self, course: Course) -> Result<()> {
        course.validate()?;
        for other in self.courses.values().filter(|c| c.slug != course.slug) {
            if let Some(clash) = course.lessons().find(|l| other.find_lesson(&l.id).is_some()) {
                return Err(CredentialError::Validation(format!(
                    "lesson '{}' already belongs to course '{}'",
                    clash.id, other.slug
                )));
            }
        }
        self.courses.insert(course.slug.clone(), course);
        Ok(())
    }

    pub fn course_by_slug(&self, slug: &str) -> Option<&Course> {
        self.courses.get(slug)
    }

    pub fn course_by_id(&self, id: &CourseId) -> Option<&Course> {
        self.courses.values().find(|c| &c.id == id)
    }

    /// Find the course owning a lesson.
    pub fn locate_lesson(&self, lesson_id: &LessonId) -> Option<(&Course, &Lesson)> {
        self.courses
            .values()
            .find_map(|c| c.find_lesson(lesson_id).map(|l| (c, l)))
    }

    // ── Attempts ──────────────────────────────────────────────────────────────

    /// Attempts for (learner, lesson), most recent first.
    pub fn attempts_for<'a>(
        &'a self,
        learner: &'a LearnerId,
        lesson: &'a LessonId,
    ) -> impl Iterator<Item = &'a QuizAttempt> + 'a {
        self.attempts
            .iter()
            .rev()
            .filter(move |a| &a.learner_id == learner && &a.lesson_id == lesson)
    }

    pub fn insert_attempt(&mut self, attempt: QuizAttempt) {
        self.attempts.push(attempt);
    }

    /// Set the cooldown lock on an existing attempt.
    pub fn lock_attempt(&mut self, id: &AttemptId, until: u64) -> Result<()> {
        let attempt = self
            .attempts
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| CredentialError::NotFound(format!("attempt {id}")))?;
        attempt.locked_until = Some(until);
        Ok(())
    }

    // ── Progress ──────────────────────────────────────────────────────────────

    pub fn upsert_progress(&mut self, record: ProgressRecord) {
        let key = pair_key(&record.learner_id.0, &record.lesson_id.0);
        self.progress.insert(key, record);
    }

    pub fn progress_for(&self, learner: &LearnerId, lesson: &LessonId) -> Option<&ProgressRecord> {
        self.progress.get(&pair_key(&learner.0, &lesson.0))
    }

    /// Number of the course's lessons with a passing progress record.
    pub fn count_passed(&self, learner: &LearnerId, course: &Course) -> usize {
        course
            .lessons()
            .filter(|l| {
                self.progress_for(learner, &l.id)
                    .map(|p| p.is_passed)
                    .unwrap_or(false)
            })
            .count()
    }

    // ── Enrollments ───────────────────────────────────────────────────────────

    pub fn enrollment(&self, learner: &LearnerId, course: &CourseId) -> Option<&Enrollment> {
        self.enrollments.get(&pair_key(&learner.0, &course.0))
    }

    pub fn upsert_enrollment(&mut self, enrollment: Enrollment) {
        let key = pair_key(&enrollment.learner_id.0, &enrollment.course_id.0);
        self.enrollments.insert(key, enrollment);
    }

    // ── Certificates ──────────────────────────────────────────────────────────

    pub fn certificate(&self, id: &CertificateId) -> Option<&Certificate> {
        self.certificates.get(id)
    }

    pub fn certificate_for_owner(&self, student: &LearnerId, course_slug: &str) -> Option<&Certificate> {
        self.certificate_owners
            .get(&pair_key(&student.0, course_slug))
            .and_then(|id| self.certificates.get(id))
    }

    pub fn certificate_by_verification_id(&self, verification_id: &str) -> Option<&Certificate> {
        self.certificates
            .values()
            .find(|c| c.verification_id == verification_id)
    }

    pub fn certificates_for_student(&self, student: &LearnerId) -> Vec<&Certificate> {
        self.certificates
            .values()
            .filter(|c| &c.student_id == student)
            .collect()
    }

    /// Insert a new certificate, enforcing the (student, course slug) uniqueness.
    pub fn insert_certificate(&mut self, cert: Certificate) -> Result<()> {
        let owner = pair_key(&cert.student_id.0, &cert.course_slug);
        if self.certificate_owners.contains_key(&owner) {
            return Err(CredentialError::StorageError(format!(
                "unique constraint violated: certificate for ({}, {}) exists",
                cert.student_id, cert.course_slug
            )));
        }
        if self.certificates.contains_key(&cert.id) {
            return Err(CredentialError::StorageError(format!(
                "duplicate certificate id {}",
                cert.id
            )));
        }
        self.certificate_owners.insert(owner, cert.id.clone());
        self.certificates.insert(cert.id.clone(), cert);
        Ok(())
    }

    /// Replace an existing certificate's stored row.
    pub fn update_certificate(&mut self, cert: Certificate) -> Result<()> {
        match self.certificates.get_mut(&cert.id) {
            Some(slot) => {
                *slot = cert;
                Ok(())
            }
            None => Err(CredentialError::NotFound(format!("certificate {}", cert.id))),
        }
    }
}
