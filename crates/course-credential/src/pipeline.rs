//! The assembled pipeline and its caller-facing operations.
//!
//! Quiz grading, progress aggregation and certificate issuance hand off to
//! each other through direct calls. Platform policy is read from the store for
//! each decision and passed explicitly to the issuer.

use std::sync::Arc;

use log::info;

use crate::certificate::{
    Certificate, CertificateAction, CertificateId, CertificateIssuer, CertificateVerification,
    Issuance, PlatformPolicy,
};
use crate::config::PipelineConfig;
use crate::course::{Course, LessonId};
use crate::crypto::OrgKeyPair;
use crate::error::{CredentialError, Result};
use crate::ledger::{ChainMinter, LedgerClient, LocalLedger, MintOutcome};
use crate::metadata::{MemoryContentStore, MetadataPublisher, MetadataStore};
use crate::principal::{authenticated, Principal, Role};
use crate::progress::{Enrollment, ProgressAggregator, ProgressRecord};
use crate::quiz::{QuizAttempt, QuizGradingService, QuizResult, QuizSubmission};
use crate::storage::JsonStore;
use crate::time::{Clock, SystemClock};

/// An administrative certificate action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Transition(CertificateAction),
    Mint,
}

impl std::str::FromStr for AdminAction {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("mint") {
            Ok(Self::Mint)
        } else {
            s.parse().map(Self::Transition)
        }
    }
}

/// Result of an administrative certificate action.
#[derive(Debug, Clone)]
pub enum AdminOutcome {
    Updated(Certificate),
    Mint(MintOutcome),
}

impl AdminOutcome {
    pub fn certificate(&self) -> &Certificate {
        match self {
            Self::Updated(c) => c,
            Self::Mint(outcome) => outcome.certificate(),
        }
    }
}

pub struct PipelineBuilder {
    store: Arc<JsonStore>,
    signer: Arc<OrgKeyPair>,
    config: PipelineConfig,
    clock: Option<Arc<dyn Clock>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
    ledger: Option<Arc<dyn LedgerClient>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Wire the components. Unset collaborators default to an in-memory
    /// content store and an in-memory local ledger.
    pub fn build(self) -> Result<CredentialPipeline> {
        self.config.validate()?;
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metadata_store = self
            .metadata_store
            .unwrap_or_else(|| Arc::new(MemoryContentStore::new()));
        let ledger = match self.ledger {
            Some(ledger) => ledger,
            None => Arc::new(LocalLedger::in_memory(
                self.signer.clone(),
                config.ledger.network.clone(),
                config.ledger.contract.clone(),
                clock.clone(),
            )),
        };
        let recipient = config
            .ledger
            .org_wallet
            .clone()
            .unwrap_or_else(|| self.signer.fingerprint());

        let publisher = Arc::new(MetadataPublisher::new(metadata_store));
        let minter = Arc::new(ChainMinter::new(
            self.store.clone(),
            publisher.clone(),
            ledger,
            clock.clone(),
            recipient,
            config.ledger.confirmation_timeout(),
        ));
        let issuer = Arc::new(CertificateIssuer::new(
            self.store.clone(),
            publisher,
            minter,
            self.signer.clone(),
            config.clone(),
            clock.clone(),
        ));
        let aggregator = ProgressAggregator::new(self.store.clone(), clock.clone());
        let grading = QuizGradingService::new(
            self.store.clone(),
            config.grading,
            clock.clone(),
            issuer.clone(),
        );

        Ok(CredentialPipeline {
            store: self.store,
            signer: self.signer,
            config,
            aggregator,
            issuer,
            grading,
        })
    }
}

/// The completion-to-credential pipeline.
pub struct CredentialPipeline {
    store: Arc<JsonStore>,
    signer: Arc<OrgKeyPair>,
    config: PipelineConfig,
    aggregator: ProgressAggregator,
    issuer: Arc<CertificateIssuer>,
    grading: QuizGradingService,
}

impl CredentialPipeline {
    pub fn builder(store: Arc<JsonStore>, signer: Arc<OrgKeyPair>) -> PipelineBuilder {
        PipelineBuilder {
            store,
            signer,
            config: PipelineConfig::default(),
            clock: None,
            metadata_store: None,
            ledger: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JsonStore> {
        &self.store
    }

    pub fn signer(&self) -> &OrgKeyPair {
        &self.signer
    }

    // ── Catalog ───────────────────────────────────────────────────────────────

    /// Add or replace a course in the catalog. Instructors and admins only.
    pub fn import_course(&self, principal: Option<&Principal>, course: Course) -> Result<()> {
        let principal = authenticated(principal)?;
        if !principal.roles.contains(Role::Instructor) {
            principal.roles.require(Role::Admin)?;
        }
        let slug = course.slug.clone();
        self.store.transaction(|s| s.upsert_course(course))?;
        info!("imported course '{slug}'");
        Ok(())
    }

    pub fn courses(&self) -> Result<Vec<Course>> {
        self.store.read(|s| s.courses.values().cloned().collect())
    }

    // ── Learner operations ────────────────────────────────────────────────────

    pub fn enroll(&self, principal: Option<&Principal>, course_slug: &str) -> Result<Enrollment> {
        self.aggregator.enroll(principal, course_slug)
    }

    /// Grade a quiz submission. A pass that completes the course issues the
    /// certificate in the same call.
    pub async fn submit_quiz(
        &self,
        principal: Option<&Principal>,
        submission: &QuizSubmission,
    ) -> Result<QuizResult> {
        self.grading.submit_attempt(principal, submission).await
    }

    pub fn attempts(&self, principal: Option<&Principal>, lesson_id: &LessonId) -> Result<Vec<QuizAttempt>> {
        self.grading.attempts(principal, lesson_id)
    }

    pub fn progress(
        &self,
        principal: Option<&Principal>,
        course_slug: &str,
    ) -> Result<(Enrollment, Vec<ProgressRecord>)> {
        self.aggregator.progress_report(principal, course_slug)
    }

    /// Issue the certificate for a completed course, or return the existing one.
    pub async fn auto_issue(
        &self,
        principal: Option<&Principal>,
        course_slug: &str,
        course_title: &str,
    ) -> Result<Issuance> {
        let policy = self.policy()?;
        self.issuer
            .auto_issue(principal, course_slug, course_title, &policy)
            .await
    }

    pub fn certificate(&self, principal: Option<&Principal>, id: &CertificateId) -> Result<Certificate> {
        self.issuer.get(principal, id)
    }

    pub fn certificates(&self, principal: Option<&Principal>) -> Result<Vec<Certificate>> {
        self.issuer.list_for_student(principal)
    }

    /// Public verification by token.
    pub fn verify_certificate(&self, verification_id: &str) -> Result<CertificateVerification> {
        self.issuer.lookup(verification_id)
    }

    // ── Administration ────────────────────────────────────────────────────────

    pub async fn admin_certificate_action(
        &self,
        principal: Option<&Principal>,
        id: &CertificateId,
        action: AdminAction,
        confirmed: bool,
    ) -> Result<AdminOutcome> {
        match action {
            AdminAction::Transition(action) => self
                .issuer
                .apply_action(principal, id, action, confirmed)
                .map(AdminOutcome::Updated),
            AdminAction::Mint => self
                .issuer
                .trigger_mint(principal, id, confirmed)
                .await
                .map(AdminOutcome::Mint),
        }
    }

    pub async fn refresh_metadata(
        &self,
        principal: Option<&Principal>,
        id: &CertificateId,
    ) -> Result<Certificate> {
        self.issuer.refresh_metadata(principal, id).await
    }

    pub fn policy(&self) -> Result<PlatformPolicy> {
        self.store.read(|s| s.policy)
    }

    pub fn set_policy(&self, principal: Option<&Principal>, policy: PlatformPolicy) -> Result<PlatformPolicy> {
        let principal = authenticated(principal)?;
        principal.roles.require(Role::Admin)?;
        self.store.transaction(|s| {
            s.policy = policy;
            Ok(policy)
        })?;
        info!(
            "policy set: auto_verify={} minting={}",
            policy.auto_verify_certificates, policy.blockchain_minting_enabled
        );
        Ok(policy)
    }
}
