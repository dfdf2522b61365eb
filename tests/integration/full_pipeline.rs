//! End-to-end tests for the completion-to-credential pipeline.
//!
//! Drives the public API the way a platform would: import a course, enroll,
//! submit quizzes under the attempt rules, and follow the certificate through
//! issuance, administration, publication and minting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use course_credential::certificate::CertificateStatus;
use course_credential::ledger::{PendingTx, TxReceipt, TxStatus};
use course_credential::time::MICROS_PER_HOUR;
use course_credential::{
    AdminAction, AdminOutcome, CertificateAction, Clock, Course, CourseId, CourseModule,
    CredentialError, CredentialPipeline, JsonStore, Lesson, LessonId, LedgerClient,
    ManualClock, MemoryContentStore, MintOutcome, OrgKeyPair, PlatformPolicy, Principal,
    QuestionId, QuizQuestion, QuizSubmission,
};

const START: u64 = 1_700_000_000_000_000;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// A course whose lessons each carry `questions` questions with correct option 0.
fn course(slug: &str, lessons: usize, questions: usize) -> Course {
    Course {
        id: CourseId(format!("course-{slug}")),
        slug: slug.to_string(),
        title: format!("Course {slug}"),
        modules: vec![CourseModule {
            id: "m1".into(),
            title: "Module 1".into(),
            lessons: (0..lessons)
                .map(|l| Lesson {
                    id: LessonId(format!("{slug}-l{l}")),
                    title: format!("Lesson {l}"),
                    quiz: (0..questions)
                        .map(|q| QuizQuestion {
                            id: QuestionId(format!("{slug}-l{l}-q{q}")),
                            prompt: format!("Question {q}"),
                            options: vec!["right".into(), "wrong".into()],
                            correct_option: 0,
                        })
                        .collect(),
                })
                .collect(),
        }],
    }
}

/// Answer `correct` of `questions` questions correctly and the rest wrongly.
fn submission(slug: &str, lesson: usize, questions: usize, correct: usize) -> QuizSubmission {
    (0..questions).fold(
        QuizSubmission::new(LessonId(format!("{slug}-l{lesson}"))),
        |s, q| s.answer(format!("{slug}-l{lesson}-q{q}"), u32::from(q >= correct)),
    )
}

/// Ledger double that counts submissions and can be switched to fail.
struct CountingLedger {
    submissions: AtomicUsize,
    failing: AtomicBool,
}

impl CountingLedger {
    fn new() -> Self {
        Self {
            submissions: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LedgerClient for CountingLedger {
    fn network(&self) -> &str {
        "testnet"
    }

    fn contract(&self) -> &str {
        "0xregistry"
    }

    async fn submit_mint(&self, _recipient: &str, _metadata_uri: &str) -> course_credential::Result<PendingTx> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CredentialError::ExternalService("rpc unavailable".into()));
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(PendingTx {
            tx_hash: format!("0xtx{n}"),
            submitted_at: START,
        })
    }

    async fn wait_for_receipt(&self, tx: &PendingTx) -> course_credential::Result<TxReceipt> {
        Ok(TxReceipt {
            tx_hash: tx.tx_hash.clone(),
            block_number: 7,
            contract: self.contract().to_string(),
            network: self.network().to_string(),
            status: TxStatus::Success,
        })
    }
}

struct Harness {
    pipeline: CredentialPipeline,
    clock: Arc<ManualClock>,
    ledger: Arc<CountingLedger>,
    admin: Principal,
}

fn harness_with_store(store: Arc<JsonStore>, signer: Arc<OrgKeyPair>) -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let ledger = Arc::new(CountingLedger::new());
    let pipeline = CredentialPipeline::builder(store, signer)
        .clock(clock.clone())
        .metadata_store(Arc::new(MemoryContentStore::new()))
        .ledger(ledger.clone())
        .build()
        .unwrap();
    Harness {
        pipeline,
        clock,
        ledger,
        admin: Principal::admin("root"),
    }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(JsonStore::in_memory()), Arc::new(OrgKeyPair::generate()))
}

impl Harness {
    fn import(&self, course: Course) {
        self.pipeline.import_course(Some(&self.admin), course).unwrap();
    }

    fn set_policy(&self, auto_verify: bool, minting: bool) {
        self.pipeline
            .set_policy(
                Some(&self.admin),
                PlatformPolicy {
                    auto_verify_certificates: auto_verify,
                    blockchain_minting_enabled: minting,
                },
            )
            .unwrap();
    }

    /// Enroll `learner` and pass every lesson of a one-question-per-lesson course.
    async fn complete(&self, learner: &Principal, slug: &str, lessons: usize) -> course_credential::QuizResult {
        self.pipeline.enroll(Some(learner), slug).unwrap();
        let mut last = None;
        for l in 0..lessons {
            last = Some(
                self.pipeline
                    .submit_quiz(Some(learner), &submission(slug, l, 1, 1))
                    .await
                    .unwrap(),
            );
        }
        last.expect("course has lessons")
    }
}

// ── Attempt governance ───────────────────────────────────────────────────────

#[tokio::test]
async fn three_failures_lock_the_quiz_until_cooldown_expires() {
    let h = harness();
    h.import(course("rust", 1, 20));
    let ada = Principal::learner("ada");
    h.pipeline.enroll(Some(&ada), "rust").unwrap();

    let first = h.pipeline.submit_quiz(Some(&ada), &submission("rust", 0, 20, 8)).await.unwrap();
    assert_eq!((first.score, first.is_passed, first.attempt_no), (40, false, 1));
    assert!(first.locked_until.is_none());

    h.clock.advance(1_000_000);
    let second = h.pipeline.submit_quiz(Some(&ada), &submission("rust", 0, 20, 11)).await.unwrap();
    assert_eq!((second.score, second.attempt_no), (55, 2));
    assert!(second.locked_until.is_none());

    h.clock.advance(1_000_000);
    let third = h.pipeline.submit_quiz(Some(&ada), &submission("rust", 0, 20, 12)).await.unwrap();
    assert_eq!((third.score, third.attempt_no), (60, 3));
    let until = third.locked_until.expect("third failure locks the quiz");
    assert_eq!(until, h.clock.now_micros() + 8 * MICROS_PER_HOUR);

    // Still locked an hour before expiry, even with a perfect answer sheet.
    h.clock.advance(7 * MICROS_PER_HOUR);
    match h.pipeline.submit_quiz(Some(&ada), &submission("rust", 0, 20, 20)).await {
        Err(CredentialError::RateLimited { locked_until, .. }) => assert_eq!(locked_until, until),
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(h.pipeline.attempts(Some(&ada), &LessonId("rust-l0".into())).unwrap().len(), 3);

    h.clock.set(until);
    let fourth = h.pipeline.submit_quiz(Some(&ada), &submission("rust", 0, 20, 14)).await.unwrap();
    assert_eq!((fourth.score, fourth.is_passed, fourth.attempt_no), (70, true, 4));
    assert_eq!(fourth.course_progress, Some(100));

    assert!(matches!(
        h.pipeline.submit_quiz(Some(&ada), &submission("rust", 0, 20, 20)).await,
        Err(CredentialError::AlreadyPassed)
    ));
}

#[tokio::test]
async fn failures_after_cooldown_get_a_fresh_window() {
    let h = harness();
    h.import(course("go", 1, 10));
    let bob = Principal::learner("bob");
    h.pipeline.enroll(Some(&bob), "go").unwrap();

    for _ in 0..3 {
        h.pipeline.submit_quiz(Some(&bob), &submission("go", 0, 10, 0)).await.unwrap();
    }
    h.clock.advance_hours(9);

    let fourth = h.pipeline.submit_quiz(Some(&bob), &submission("go", 0, 10, 0)).await.unwrap();
    assert_eq!(fourth.attempt_no, 4);
    assert!(fourth.locked_until.is_none());
    let fifth = h.pipeline.submit_quiz(Some(&bob), &submission("go", 0, 10, 0)).await.unwrap();
    assert!(fifth.locked_until.is_none());
    let sixth = h.pipeline.submit_quiz(Some(&bob), &submission("go", 0, 10, 0)).await.unwrap();
    assert!(sixth.locked_until.is_some());
}

// ── Issuance ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn completion_issues_one_certificate_per_learner_and_course() {
    let h = harness();
    h.import(course("sql", 3, 1));
    let ada = Principal::learner("ada").with_display_name("Ada Lovelace");

    let last = h.complete(&ada, "sql", 3).await;
    assert_eq!(last.course_progress, Some(100));
    let issued = last.issuance.expect("issued on completion");
    assert!(!issued.already_existed());
    let cert = issued.certificate().clone();
    assert_eq!(cert.student_name, "Ada Lovelace");
    assert_eq!(cert.course_title, "Course sql");
    assert_eq!(cert.status, CertificateStatus::Pending);
    assert!(cert.metadata_uri.as_deref().unwrap_or("").starts_with("ipfs://"));

    for _ in 0..2 {
        let again = h.pipeline.auto_issue(Some(&ada), "sql", "Other title").await.unwrap();
        assert!(again.already_existed());
        assert_eq!(again.certificate(), &cert);
    }
    assert_eq!(h.pipeline.certificates(Some(&ada)).unwrap().len(), 1);
}

#[tokio::test]
async fn incomplete_course_is_not_certified() {
    let h = harness();
    h.import(course("sql", 2, 1));
    let ada = Principal::learner("ada");
    h.pipeline.enroll(Some(&ada), "sql").unwrap();
    let half = h.pipeline.submit_quiz(Some(&ada), &submission("sql", 0, 1, 1)).await.unwrap();
    assert_eq!(half.course_progress, Some(50));
    assert!(half.issuance.is_none());

    assert!(matches!(
        h.pipeline.auto_issue(Some(&ada), "sql", "").await,
        Err(CredentialError::NotCompleted(_))
    ));
    assert!(matches!(
        h.pipeline.auto_issue(None, "sql", "").await,
        Err(CredentialError::Unauthenticated)
    ));
}

#[tokio::test]
async fn auto_verify_without_minting_leaves_certificate_unminted() {
    let h = harness();
    h.import(course("css", 1, 1));
    h.set_policy(true, false);
    let ada = Principal::learner("ada");

    let issuance = h.complete(&ada, "css", 1).await.issuance.expect("issued");
    let (cert, task) = issuance.into_parts();
    assert!(task.is_none());
    assert_eq!(cert.status, CertificateStatus::Verified);
    assert!(cert.blockchain_tx.is_none());
    assert_eq!(h.ledger.submissions(), 0);

    let check = h.pipeline.verify_certificate(&cert.verification_id).unwrap();
    assert!(check.seal_valid);
    assert!(check.is_authoritative);
    assert!(!check.minted);
}

// ── Minting ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn minting_on_issue_submits_exactly_once() {
    let h = harness();
    h.import(course("web3", 1, 1));
    h.set_policy(true, true);
    let ada = Principal::learner("ada");

    let issuance = h.complete(&ada, "web3", 1).await.issuance.expect("issued");
    let (cert, task) = issuance.into_parts();
    let outcome = task.expect("mint scheduled").join().await.unwrap();
    let minted = match outcome {
        MintOutcome::Minted(c) => c,
        other => panic!("expected Minted, got {other:?}"),
    };
    assert_eq!(minted.id, cert.id);
    assert_eq!(minted.blockchain_tx.as_deref(), Some("0xtx0"));
    assert_eq!(minted.blockchain_network.as_deref(), Some("testnet"));
    assert_eq!(minted.blockchain_contract.as_deref(), Some("0xregistry"));
    assert!(minted.minted_at.is_some());

    let again = h
        .pipeline
        .admin_certificate_action(Some(&h.admin), &cert.id, AdminAction::Mint, true)
        .await
        .unwrap();
    assert!(matches!(again, AdminOutcome::Mint(MintOutcome::AlreadyMinted(_))));
    assert_eq!(h.ledger.submissions(), 1);
}

#[tokio::test]
async fn ledger_failure_leaves_certificate_verified_and_retryable() {
    let h = harness();
    h.import(course("web3", 1, 1));
    h.set_policy(true, true);
    h.ledger.set_failing(true);
    let ada = Principal::learner("ada");

    let (cert, task) = h.complete(&ada, "web3", 1).await.issuance.expect("issued").into_parts();
    let outcome = task.expect("mint scheduled").join().await.unwrap();
    assert!(outcome.is_failed());
    let stored = h.pipeline.certificate(Some(&ada), &cert.id).unwrap();
    assert_eq!(stored.status, CertificateStatus::Verified);
    assert!(stored.blockchain_tx.is_none());
    assert!(stored.minted_at.is_none());

    h.ledger.set_failing(false);
    let retry = h
        .pipeline
        .admin_certificate_action(Some(&h.admin), &cert.id, AdminAction::Mint, true)
        .await
        .unwrap();
    assert!(matches!(retry, AdminOutcome::Mint(MintOutcome::Minted(_))));
    assert!(retry.certificate().is_minted());
    assert_eq!(h.ledger.submissions(), 1);
}

// ── Administration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_lifecycle_controls_public_verification() {
    let h = harness();
    h.import(course("ops", 1, 1));
    let ada = Principal::learner("ada");
    let cert = h.complete(&ada, "ops", 1).await.issuance.expect("issued").certificate().clone();

    let verify = AdminAction::Transition(CertificateAction::Verify);
    assert!(matches!(
        h.pipeline.admin_certificate_action(Some(&ada), &cert.id, verify, true).await,
        Err(CredentialError::Forbidden(_))
    ));
    assert!(matches!(
        h.pipeline.admin_certificate_action(Some(&h.admin), &cert.id, verify, false).await,
        Err(CredentialError::ConfirmationRequired(_))
    ));
    // Minting needs a verified certificate.
    assert!(matches!(
        h.pipeline.admin_certificate_action(Some(&h.admin), &cert.id, AdminAction::Mint, true).await,
        Err(CredentialError::InvalidTransition { .. })
    ));

    let verified = h
        .pipeline
        .admin_certificate_action(Some(&h.admin), &cert.id, verify, true)
        .await
        .unwrap();
    assert_eq!(verified.certificate().status, CertificateStatus::Verified);
    assert!(h.pipeline.verify_certificate(&cert.verification_id).unwrap().is_authoritative);

    h.pipeline
        .admin_certificate_action(
            Some(&h.admin),
            &cert.id,
            AdminAction::Transition(CertificateAction::Revoke),
            true,
        )
        .await
        .unwrap();
    let check = h.pipeline.verify_certificate(&cert.verification_id).unwrap();
    assert!(check.seal_valid);
    assert!(!check.is_authoritative);
    assert_eq!(check.certificate.status, CertificateStatus::Revoked);

    let restored = h
        .pipeline
        .admin_certificate_action(
            Some(&h.admin),
            &cert.id,
            AdminAction::Transition(CertificateAction::Restore),
            true,
        )
        .await
        .unwrap();
    assert_eq!(restored.certificate().status, CertificateStatus::Pending);
}

#[tokio::test]
async fn refreshing_unchanged_metadata_keeps_its_address() {
    let h = harness();
    h.import(course("ops", 1, 1));
    let ada = Principal::learner("ada");
    let cert = h.complete(&ada, "ops", 1).await.issuance.expect("issued").certificate().clone();
    let before = cert.metadata_uri.clone().expect("published at issuance");

    assert!(matches!(
        h.pipeline.refresh_metadata(Some(&ada), &cert.id).await,
        Err(CredentialError::Forbidden(_))
    ));
    let refreshed = h.pipeline.refresh_metadata(Some(&h.admin), &cert.id).await.unwrap();
    assert_eq!(refreshed.metadata_uri.as_deref(), Some(before.as_str()));
    assert_eq!(
        h.pipeline.certificate(Some(&ada), &cert.id).unwrap().metadata_uri,
        Some(before)
    );
}

#[tokio::test]
async fn certificates_are_private_to_owner_and_admins() {
    let h = harness();
    h.import(course("ops", 1, 1));
    let ada = Principal::learner("ada");
    let cert = h.complete(&ada, "ops", 1).await.issuance.expect("issued").certificate().clone();

    assert!(h.pipeline.certificate(Some(&ada), &cert.id).is_ok());
    assert!(h.pipeline.certificate(Some(&h.admin), &cert.id).is_ok());
    assert!(matches!(
        h.pipeline.certificate(Some(&Principal::learner("eve")), &cert.id),
        Err(CredentialError::Forbidden(_))
    ));
    assert!(h.pipeline.certificates(Some(&Principal::learner("eve"))).unwrap().is_empty());
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let signer = Arc::new(OrgKeyPair::generate());
    let ada = Principal::learner("ada");

    let cert = {
        let h = harness_with_store(Arc::new(JsonStore::open(&path).unwrap()), signer.clone());
        h.import(course("db", 2, 1));
        h.complete(&ada, "db", 2).await.issuance.expect("issued").certificate().clone()
    };

    let h = harness_with_store(Arc::new(JsonStore::open(&path).unwrap()), signer);
    let (enrollment, records) = h.pipeline.progress(Some(&ada), "db").unwrap();
    assert!(enrollment.completed);
    assert_eq!(records.len(), 2);
    assert_eq!(h.pipeline.certificate(Some(&ada), &cert.id).unwrap(), cert);
    assert!(h.pipeline.verify_certificate(&cert.verification_id).unwrap().seal_valid);
    assert!(h.pipeline.auto_issue(Some(&ada), "db", "").await.unwrap().already_existed());
}
