//! Edge cases: degenerate catalogs, malformed submissions, rounding at the
//! pass threshold, foreign signing keys and damaged store files.

use std::sync::Arc;

use course_credential::config::MAX_COOLDOWN_HOURS;
use course_credential::{
    Course, CourseId, CourseModule, CredentialError, CredentialPipeline, GradingRules, JsonStore,
    Lesson, LessonId, ManualClock, OrgKeyPair, PipelineConfig, Principal, QuestionId,
    QuizQuestion, QuizSubmission,
};

fn lesson(id: &str, questions: usize) -> Lesson {
    Lesson {
        id: LessonId(id.to_string()),
        title: id.to_string(),
        quiz: (0..questions)
            .map(|q| QuizQuestion {
                id: QuestionId(format!("{id}-q{q}")),
                prompt: format!("Question {q}"),
                options: vec!["yes".into(), "no".into()],
                correct_option: 0,
            })
            .collect(),
    }
}

fn course(slug: &str, lessons: Vec<Lesson>) -> Course {
    Course {
        id: CourseId(format!("course-{slug}")),
        slug: slug.to_string(),
        title: format!("Course {slug}"),
        modules: vec![CourseModule {
            id: "m1".into(),
            title: "Module".into(),
            lessons,
        }],
    }
}

fn pipeline_on(store: Arc<JsonStore>, signer: Arc<OrgKeyPair>) -> CredentialPipeline {
    CredentialPipeline::builder(store, signer)
        .build()
        .expect("pipeline builds")
}

fn pipeline() -> CredentialPipeline {
    pipeline_on(Arc::new(JsonStore::in_memory()), Arc::new(OrgKeyPair::generate()))
}

fn admin() -> Principal {
    Principal::admin("root")
}

#[tokio::test]
async fn edge_course_without_lessons_never_completes() {
    let p = pipeline();
    p.import_course(Some(&admin()), course("empty", vec![])).unwrap();
    let ada = Principal::learner("ada");

    let enrollment = p.enroll(Some(&ada), "empty").unwrap();
    assert_eq!(enrollment.progress, 0);
    assert!(!enrollment.completed);
    assert!(matches!(
        p.auto_issue(Some(&ada), "empty", "").await,
        Err(CredentialError::NotCompleted(_))
    ));
}

#[tokio::test]
async fn edge_lesson_without_quiz_cannot_be_submitted() {
    let p = pipeline();
    p.import_course(Some(&admin()), course("reading", vec![lesson("read-1", 0)]))
        .unwrap();
    let ada = Principal::learner("ada");
    p.enroll(Some(&ada), "reading").unwrap();

    let submission = QuizSubmission::new(LessonId("read-1".into())).answer("read-1-q0", 0);
    assert!(matches!(
        p.submit_quiz(Some(&ada), &submission).await,
        Err(CredentialError::NotFound(_))
    ));
}

#[tokio::test]
async fn edge_malformed_submissions_do_not_consume_attempts() {
    let p = pipeline();
    p.import_course(Some(&admin()), course("c", vec![lesson("c-1", 2)]))
        .unwrap();
    let ada = Principal::learner("ada");
    p.enroll(Some(&ada), "c").unwrap();

    for _ in 0..5 {
        assert!(matches!(
            p.submit_quiz(Some(&ada), &QuizSubmission::new(LessonId("c-1".into())))
                .await,
            Err(CredentialError::Validation(_))
        ));
        let stray = QuizSubmission::new(LessonId("c-1".into())).answer("other-q", 0);
        assert!(matches!(
            p.submit_quiz(Some(&ada), &stray).await,
            Err(CredentialError::Validation(_))
        ));
    }
    assert!(p.attempts(Some(&ada), &LessonId("c-1".into())).unwrap().is_empty());

    // Unanswered questions count as wrong.
    let partial = QuizSubmission::new(LessonId("c-1".into())).answer("c-1-q0", 0);
    let result = p.submit_quiz(Some(&ada), &partial).await.unwrap();
    assert_eq!((result.score, result.is_passed, result.attempt_no), (50, false, 1));
}

#[tokio::test]
async fn edge_threshold_uses_rounded_score() {
    let p = pipeline();
    p.import_course(
        Some(&admin()),
        course("round", vec![lesson("r-3", 3), lesson("r-10", 10)]),
    )
    .unwrap();
    let ada = Principal::learner("ada");
    p.enroll(Some(&ada), "round").unwrap();

    // 2 of 3 rounds to 67: below 70.
    let two_of_three = QuizSubmission::new(LessonId("r-3".into()))
        .answer("r-3-q0", 0)
        .answer("r-3-q1", 0)
        .answer("r-3-q2", 1);
    let result = p.submit_quiz(Some(&ada), &two_of_three).await.unwrap();
    assert_eq!((result.score, result.is_passed), (67, false));

    // 7 of 10 is exactly the threshold.
    let seven = (0..10).fold(QuizSubmission::new(LessonId("r-10".into())), |s, q| {
        s.answer(format!("r-10-q{q}"), u32::from(q >= 7))
    });
    let result = p.submit_quiz(Some(&ada), &seven).await.unwrap();
    assert_eq!((result.score, result.is_passed), (70, true));
    assert_eq!(result.course_progress, Some(50));
}

#[tokio::test]
async fn edge_catalog_rejects_shared_lesson_ids_and_learner_imports() {
    let p = pipeline();
    p.import_course(Some(&admin()), course("a", vec![lesson("shared", 1)]))
        .unwrap();
    assert!(matches!(
        p.import_course(Some(&admin()), course("b", vec![lesson("shared", 1)])),
        Err(CredentialError::Validation(_))
    ));
    assert!(matches!(
        p.import_course(Some(&Principal::learner("ada")), course("c", vec![lesson("c-1", 1)])),
        Err(CredentialError::Forbidden(_))
    ));
    assert!(matches!(
        p.import_course(None, course("c", vec![lesson("c-1", 1)])),
        Err(CredentialError::Unauthenticated)
    ));
    // Re-importing a course under its own slug replaces it.
    p.import_course(Some(&admin()), course("a", vec![lesson("shared", 2)]))
        .unwrap();
    assert_eq!(p.courses().unwrap().len(), 1);
}

#[tokio::test]
async fn edge_enrollment_is_idempotent_and_requires_known_course() {
    let p = pipeline();
    p.import_course(Some(&admin()), course("c", vec![lesson("c-1", 1)]))
        .unwrap();
    let ada = Principal::learner("ada");
    let first = p.enroll(Some(&ada), "c").unwrap();
    let second = p.enroll(Some(&ada), "c").unwrap();
    assert_eq!(first, second);
    assert!(matches!(
        p.enroll(Some(&ada), "missing"),
        Err(CredentialError::NotFound(_))
    ));
    assert!(matches!(p.enroll(None, "c"), Err(CredentialError::Unauthenticated)));
}

#[tokio::test]
async fn edge_unknown_verification_id_is_not_found() {
    let p = pipeline();
    assert!(matches!(
        p.verify_certificate("no-such-token"),
        Err(CredentialError::NotFound(_))
    ));
}

#[tokio::test]
async fn edge_certificate_sealed_by_another_key_is_not_authoritative() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let ada = Principal::learner("ada");

    let cert = {
        let p = pipeline_on(
            Arc::new(JsonStore::open(&path).unwrap()),
            Arc::new(OrgKeyPair::generate()),
        );
        p.import_course(Some(&admin()), course("c", vec![lesson("c-1", 1)]))
            .unwrap();
        p.set_policy(
            Some(&admin()),
            course_credential::PlatformPolicy {
                auto_verify_certificates: true,
                blockchain_minting_enabled: false,
            },
        )
        .unwrap();
        p.enroll(Some(&ada), "c").unwrap();
        let submission = QuizSubmission::new(LessonId("c-1".into())).answer("c-1-q0", 0);
        p.submit_quiz(Some(&ada), &submission)
            .await
            .unwrap()
            .issuance
            .expect("issued")
            .certificate()
            .clone()
    };

    let other = pipeline_on(
        Arc::new(JsonStore::open(&path).unwrap()),
        Arc::new(OrgKeyPair::generate()),
    );
    let check = other.verify_certificate(&cert.verification_id).unwrap();
    assert!(!check.seal_valid);
    assert!(!check.errors.is_empty());
    assert!(!check.is_authoritative);
}

#[test]
fn edge_damaged_store_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, b"{ not json").unwrap();
    assert!(matches!(
        JsonStore::open(&path),
        Err(CredentialError::InvalidFileFormat(_))
    ));
}

#[tokio::test]
async fn edge_large_course_progress_rounds_per_lesson() {
    let p = pipeline();
    let lessons = (0..150).map(|i| lesson(&format!("big-{i}"), 1)).collect();
    p.import_course(Some(&admin()), course("big", lessons)).unwrap();
    let ada = Principal::learner("ada");
    p.enroll(Some(&ada), "big").unwrap();

    for i in 0..150 {
        let id = format!("big-{i}");
        let result = p
            .submit_quiz(
                Some(&ada),
                &QuizSubmission::new(LessonId(id.clone())).answer(format!("{id}-q0"), 0),
            )
            .await
            .unwrap();
        let expected = ((i + 1) as f64 * 100.0 / 150.0).round() as u8;
        assert_eq!(result.course_progress, Some(expected), "after lesson {i}");
        assert_eq!(result.issuance.is_some(), i == 149);
    }
}

#[test]
fn edge_oversized_cooldown_is_refused_at_build() {
    let config = PipelineConfig {
        grading: GradingRules {
            cooldown_hours: 10_000_000_000_000,
            ..GradingRules::default()
        },
        ..PipelineConfig::default()
    };
    let built = CredentialPipeline::builder(
        Arc::new(JsonStore::in_memory()),
        Arc::new(OrgKeyPair::generate()),
    )
    .config(config)
    .build();
    assert!(matches!(built, Err(CredentialError::Config(_))));
}

#[tokio::test]
async fn edge_lock_near_end_of_time_stays_locked() {
    let clock = Arc::new(ManualClock::new(u64::MAX - 1_000));
    let config = PipelineConfig {
        grading: GradingRules {
            cooldown_hours: MAX_COOLDOWN_HOURS,
            ..GradingRules::default()
        },
        ..PipelineConfig::default()
    };
    let p = CredentialPipeline::builder(
        Arc::new(JsonStore::in_memory()),
        Arc::new(OrgKeyPair::generate()),
    )
    .config(config)
    .clock(clock.clone())
    .build()
    .unwrap();
    p.import_course(Some(&admin()), course("c", vec![lesson("c-1", 1)]))
        .unwrap();
    let ada = Principal::learner("ada");
    p.enroll(Some(&ada), "c").unwrap();

    let wrong = QuizSubmission::new(LessonId("c-1".into())).answer("c-1-q0", 1);
    let mut last = None;
    for _ in 0..3 {
        last = Some(p.submit_quiz(Some(&ada), &wrong).await.unwrap());
    }
    assert_eq!(last.unwrap().locked_until, Some(u64::MAX));

    clock.advance(500);
    assert!(matches!(
        p.submit_quiz(Some(&ada), &wrong).await,
        Err(CredentialError::RateLimited { .. })
    ));
}
