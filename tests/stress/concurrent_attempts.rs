//! Stress test: concurrent quiz submissions for the same learner and lesson.
//!
//! Submissions are serialized by the store, so a burst of failing attempts
//! can never exceed the attempt limit and a burst of passing attempts records
//! exactly one pass.

use std::collections::BTreeSet;
use std::sync::Arc;

use course_credential::{
    Course, CourseId, CourseModule, CredentialError, CredentialPipeline, JsonStore, Lesson,
    LessonId, ManualClock, OrgKeyPair, Principal, QuestionId, QuizQuestion, QuizSubmission,
};

const START: u64 = 1_700_000_000_000_000;

fn course() -> Course {
    Course {
        id: CourseId("course-burst".into()),
        slug: "burst".into(),
        title: "Burst".into(),
        modules: vec![CourseModule {
            id: "m1".into(),
            title: "Module".into(),
            lessons: (0..2)
                .map(|l| Lesson {
                    id: LessonId(format!("burst-l{l}")),
                    title: format!("Lesson {l}"),
                    quiz: (0..4)
                        .map(|q| QuizQuestion {
                            id: QuestionId(format!("q{q}")),
                            prompt: format!("Question {q}"),
                            options: vec!["a".into(), "b".into(), "c".into()],
                            correct_option: 2,
                        })
                        .collect(),
                })
                .collect(),
        }],
    }
}

fn answers(lesson: usize, option: u32) -> QuizSubmission {
    (0..4).fold(
        QuizSubmission::new(LessonId(format!("burst-l{lesson}"))),
        |s, q| s.answer(format!("q{q}"), option),
    )
}

fn pipeline() -> (Arc<CredentialPipeline>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let pipeline = CredentialPipeline::builder(
        Arc::new(JsonStore::in_memory()),
        Arc::new(OrgKeyPair::generate()),
    )
    .clock(clock.clone())
    .build()
    .expect("pipeline builds");
    pipeline
        .import_course(Some(&Principal::admin("root")), course())
        .expect("course imports");
    (Arc::new(pipeline), clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_failing_burst_respects_attempt_limit() {
    let (pipeline, _clock) = pipeline();
    let ada = Principal::learner("ada");
    pipeline.enroll(Some(&ada), "burst").unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pipeline = Arc::clone(&pipeline);
        let ada = ada.clone();
        handles.push(tokio::spawn(async move {
            pipeline.submit_quiz(Some(&ada), &answers(0, 0)).await
        }));
    }

    let mut graded = Vec::new();
    let mut limited = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(result) => graded.push(result),
            Err(CredentialError::RateLimited { .. }) => limited += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(graded.len(), 3, "only max_attempts submissions are graded");
    assert_eq!(limited, 17);
    let numbers: BTreeSet<u32> = graded.iter().map(|r| r.attempt_no).collect();
    assert_eq!(numbers, BTreeSet::from([1, 2, 3]));
    assert_eq!(graded.iter().filter(|r| r.locked_until.is_some()).count(), 1);

    let stored = pipeline
        .attempts(Some(&ada), &LessonId("burst-l0".into()))
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].attempt_no, 3);
    assert!(stored[0].locked_until.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_passing_burst_records_one_pass() {
    let (pipeline, _clock) = pipeline();
    let ada = Principal::learner("ada");
    pipeline.enroll(Some(&ada), "burst").unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pipeline = Arc::clone(&pipeline);
        let ada = ada.clone();
        handles.push(tokio::spawn(async move {
            pipeline.submit_quiz(Some(&ada), &answers(1, 2)).await
        }));
    }

    let mut passed = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(result) => {
                assert!(result.is_passed);
                assert_eq!(result.course_progress, Some(50));
                passed += 1;
            }
            Err(CredentialError::AlreadyPassed) => already += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((passed, already), (1, 19));

    let (enrollment, records) = pipeline.progress(Some(&ada), "burst").unwrap();
    assert_eq!(enrollment.progress, 50);
    assert!(!enrollment.completed);
    assert_eq!(records.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_many_learners_do_not_share_windows() {
    let (pipeline, clock) = pipeline();

    let mut handles = Vec::new();
    for i in 0..40 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let learner = Principal::learner(format!("learner-{i}"));
            pipeline.enroll(Some(&learner), "burst").unwrap();
            for _ in 0..3 {
                pipeline
                    .submit_quiz(Some(&learner), &answers(0, 1))
                    .await
                    .expect("each learner has their own three attempts");
            }
            learner
        }));
    }

    let mut learners = Vec::new();
    for handle in handles {
        learners.push(handle.await.expect("task completes"));
    }

    // Everyone is locked now; after the cooldown everyone may try again.
    for learner in &learners {
        assert!(matches!(
            pipeline.submit_quiz(Some(learner), &answers(0, 2)).await,
            Err(CredentialError::RateLimited { .. })
        ));
    }
    clock.advance_hours(8);
    for learner in &learners {
        let result = pipeline.submit_quiz(Some(learner), &answers(0, 2)).await.unwrap();
        assert!(result.is_passed);
        assert_eq!(result.attempt_no, 4);
    }
}
