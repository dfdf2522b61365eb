//! Quiz grading and attempt governance.
//!
//! A submission is checked for eligibility, graded, and recorded in one store
//! transaction, so two concurrent submissions for the same (learner, lesson)
//! are serialized and cannot both slip under the attempt limit.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::certificate::CertificateIssuer;
use crate::config::GradingRules;
use crate::course::{Lesson, LessonId, QuestionId};
use crate::crypto::signing::{digest_fields, id_from_digest};
use crate::error::{CredentialError, Result};
use crate::principal::{authenticated, LearnerId, Principal};
use crate::progress::{ProgressAggregator, ProgressRecord};
use crate::storage::JsonStore;
use crate::time::Clock;

use super::types::*;

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

/// Grade `answers` against a lesson's quiz.
///
/// Unanswered questions count as wrong. Answers naming a question the quiz
/// does not contain make the submission malformed.
pub fn grade_answers(
    lesson: &Lesson,
    answers: &BTreeMap<QuestionId, u32>,
    pass_threshold: u8,
) -> Result<Grade> {
    if lesson.quiz.is_empty() {
        return Err(CredentialError::NotFound(format!(
            "lesson '{}' has no quiz",
            lesson.id
        )));
    }
    if answers.is_empty() {
        return Err(CredentialError::Validation("no answers submitted".into()));
    }
    if let Some(unknown) = answers
        .keys()
        .find(|q| !lesson.quiz.iter().any(|question| &question.id == *q))
    {
        return Err(CredentialError::Validation(format!(
            "question '{unknown}' is not part of lesson '{}'",
            lesson.id
        )));
    }

    let total = lesson.quiz.len() as u32;
    let correct = lesson
        .quiz
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_option))
        .count() as u32;
    let score = (100.0 * correct as f64 / total as f64).round() as u8;

    Ok(Grade {
        correct,
        total,
        score,
        is_passed: score >= pass_threshold,
    })
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Decide whether a new submission may be graded.
///
/// `history` holds every attempt for the (learner, lesson), most recent
/// first. The failure window counts recent attempts back to the last one that
/// carried a cooldown lock; once that lock has expired the window starts
/// empty again.
pub fn check_eligibility(history: &[QuizAttempt], rules: &GradingRules, now: u64) -> Eligibility {
    if history.iter().any(|a| a.is_passed) {
        return Eligibility::AlreadyPassed;
    }

    if let Some(until) = history.first().and_then(|a| a.locked_until) {
        if now < until {
            return Eligibility::Locked { until };
        }
    }

    let window = history
        .iter()
        .take(rules.max_attempts as usize)
        .take_while(|a| a.locked_until.is_none())
        .count() as u32;

    if window >= rules.max_attempts {
        if let Some(latest) = history.first() {
            return Eligibility::Exhausted {
                lock_attempt: latest.id.clone(),
            };
        }
    }

    Eligibility::Eligible {
        prior_attempts: history.len() as u32,
        failures_in_window: window,
    }
}

fn attempt_id(learner: &LearnerId, lesson: &LessonId, attempt_no: u32, now: u64) -> AttemptId {
    let digest = digest_fields(&[
        &learner.0,
        &lesson.0,
        &attempt_no.to_string(),
        &now.to_string(),
    ]);
    AttemptId(id_from_digest("att", &digest))
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

enum SubmitOutcome {
    Graded {
        attempt: QuizAttempt,
        course_slug: String,
        course_title: String,
        course_progress: Option<u8>,
    },
    LockedNow {
        until: u64,
    },
}

/// Grades submissions and enforces the retry and cooldown rules.
pub struct QuizGradingService {
    store: Arc<JsonStore>,
    rules: GradingRules,
    clock: Arc<dyn Clock>,
    issuer: Arc<CertificateIssuer>,
}

impl QuizGradingService {
    pub fn new(
        store: Arc<JsonStore>,
        rules: GradingRules,
        clock: Arc<dyn Clock>,
        issuer: Arc<CertificateIssuer>,
    ) -> Self {
        Self {
            store,
            rules,
            clock,
            issuer,
        }
    }

    pub fn rules(&self) -> &GradingRules {
        &self.rules
    }

    /// Grade a submission for the authenticated learner.
    ///
    /// On a pass the course progress is recomputed; reaching 100% triggers
    /// certificate issuance. Issuance problems are logged and do not undo
    /// the recorded grade.
    pub async fn submit_attempt(
        &self,
        principal: Option<&Principal>,
        submission: &QuizSubmission,
    ) -> Result<QuizResult> {
        let principal = authenticated(principal)?;
        let learner = &principal.learner_id;
        let lesson_id = &submission.lesson_id;
        let now = self.clock.now_micros();
        let rules = self.rules;

        let outcome = self.store.transaction(|state| {
            let (course, lesson) = state
                .locate_lesson(lesson_id)
                .ok_or_else(|| CredentialError::NotFound(format!("lesson '{lesson_id}'")))?;
            let lesson = lesson.clone();
            let course_id = course.id.clone();
            let course_slug = course.slug.clone();
            let course_title = course.title.clone();

            if state.enrollment(learner, &course_id).is_none() {
                return Err(CredentialError::NotFound(format!(
                    "enrollment of {learner} in '{course_slug}'"
                )));
            }

            let history: Vec<QuizAttempt> = state.attempts_for(learner, lesson_id).cloned().collect();
            let (prior_attempts, failures_in_window) =
                match check_eligibility(&history, &rules, now) {
                    Eligibility::AlreadyPassed => return Err(CredentialError::AlreadyPassed),
                    Eligibility::Locked { until } => {
                        return Err(CredentialError::rate_limited(until))
                    }
                    Eligibility::Exhausted { lock_attempt } => {
                        let until = rules.lock_expiry(now);
                        state.lock_attempt(&lock_attempt, until)?;
                        return Ok(SubmitOutcome::LockedNow { until });
                    }
                    Eligibility::Eligible {
                        prior_attempts,
                        failures_in_window,
                    } => (prior_attempts, failures_in_window),
                };

            let grade = grade_answers(&lesson, &submission.answers, rules.pass_threshold)?;
            let attempt_no = prior_attempts + 1;
            let locked_until = (!grade.is_passed && failures_in_window + 1 >= rules.max_attempts)
                .then(|| rules.lock_expiry(now));

            let attempt = QuizAttempt {
                id: attempt_id(learner, lesson_id, attempt_no, now),
                learner_id: learner.clone(),
                lesson_id: lesson_id.clone(),
                course_id: course_id.clone(),
                score: grade.score,
                is_passed: grade.is_passed,
                attempt_no,
                locked_until,
                created_at: now,
            };
            state.insert_attempt(attempt.clone());
            state.upsert_progress(ProgressRecord {
                learner_id: learner.clone(),
                lesson_id: lesson_id.clone(),
                course_id: course_id.clone(),
                score: grade.score,
                is_passed: grade.is_passed,
                completed_at: now,
            });

            let course_progress = if grade.is_passed {
                Some(ProgressAggregator::recompute_in(state, learner, &course_id, now)?.progress)
            } else {
                None
            };

            Ok(SubmitOutcome::Graded {
                attempt,
                course_slug,
                course_title,
                course_progress,
            })
        })?;

        let (attempt, course_slug, course_title, course_progress) = match outcome {
            SubmitOutcome::LockedNow { until } => {
                warn!("quiz {lesson_id} locked for {learner} until {until}");
                return Err(CredentialError::rate_limited(until));
            }
            SubmitOutcome::Graded {
                attempt,
                course_slug,
                course_title,
                course_progress,
            } => (attempt, course_slug, course_title, course_progress),
        };

        debug!(
            "graded {lesson_id} for {learner}: score {} attempt {}",
            attempt.score, attempt.attempt_no
        );
        if let Some(until) = attempt.locked_until {
            warn!("quiz {lesson_id} locked for {learner} until {until}");
        }

        let issuance = if course_progress == Some(100) {
            info!("{learner} completed '{course_slug}'");
            let policy = self.store.read(|s| s.policy)?;
            match self
                .issuer
                .auto_issue(Some(principal), &course_slug, &course_title, &policy)
                .await
            {
                Ok(issuance) => Some(issuance),
                Err(e) => {
                    warn!("automatic issuance for {learner} in '{course_slug}' failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(QuizResult {
            score: attempt.score,
            is_passed: attempt.is_passed,
            attempt_no: attempt.attempt_no,
            locked_until: attempt.locked_until,
            course_progress,
            issuance,
        })
    }

    /// The principal's attempts for a lesson, most recent first.
    pub fn attempts(&self, principal: Option<&Principal>, lesson_id: &LessonId) -> Result<Vec<QuizAttempt>> {
        let principal = authenticated(principal)?;
        self.store.read(|s| {
            s.attempts_for(&principal.learner_id, lesson_id)
                .cloned()
                .collect()
        })
    }
}
