//! Certificate issuance and lifecycle administration.
//!
//! Issuance is idempotent per (student, course slug): the existence check and
//! the insert happen in one store transaction, and the store's owner index
//! rejects a second row outright. Metadata publication after creation is
//! best-effort, and minting runs on a background task.

use std::sync::Arc;

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::crypto::random::random_token;
use crate::crypto::OrgKeyPair;
use crate::error::{CredentialError, Result};
use crate::ledger::{ChainMinter, MintOutcome};
use crate::metadata::MetadataPublisher;
use crate::principal::{authenticated, Principal, Role};
use crate::storage::JsonStore;
use crate::time::Clock;

use super::seal::{check_seal, CertificateBuilder};
use super::types::*;

enum Created {
    New(Certificate),
    Existing(Certificate),
}

pub struct CertificateIssuer {
    store: Arc<JsonStore>,
    publisher: Arc<MetadataPublisher>,
    minter: Arc<ChainMinter>,
    signer: Arc<OrgKeyPair>,
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
}

impl CertificateIssuer {
    pub fn new(
        store: Arc<JsonStore>,
        publisher: Arc<MetadataPublisher>,
        minter: Arc<ChainMinter>,
        signer: Arc<OrgKeyPair>,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            minter,
            signer,
            config,
            clock,
        }
    }

    // ---------------------------------------------------------------------
    // Issuance
    // ---------------------------------------------------------------------

    /// Issue the principal's certificate for a completed course, or return
    /// the existing one unchanged.
    ///
    /// Completion is re-checked here from enrollment and lesson records.
    /// `policy` decides the initial status and whether a mint is scheduled.
    pub async fn auto_issue(
        &self,
        principal: Option<&Principal>,
        course_slug: &str,
        course_title: &str,
        policy: &PlatformPolicy,
    ) -> Result<Issuance> {
        let principal = authenticated(principal)?;
        let learner = &principal.learner_id;
        let now = self.clock.now_micros();
        let verification_id = random_token();
        let verification_url = self.config.verification_url(&verification_id);
        let status = if policy.auto_verify_certificates {
            CertificateStatus::Verified
        } else {
            CertificateStatus::Pending
        };

        let created = self.store.transaction(|state| {
            let course = state
                .course_by_slug(course_slug)
                .ok_or_else(|| CredentialError::NotFound(format!("course '{course_slug}'")))?;
            let enrollment = state.enrollment(learner, &course.id).ok_or_else(|| {
                CredentialError::NotFound(format!("enrollment of {learner} in '{course_slug}'"))
            })?;

            if let Some(existing) = state.certificate_for_owner(learner, course_slug) {
                return Ok(Created::Existing(existing.clone()));
            }

            if !enrollment.completed || enrollment.progress < 100 {
                return Err(CredentialError::NotCompleted(format!(
                    "'{course_slug}' is at {}%",
                    enrollment.progress
                )));
            }
            let total = course.lesson_count();
            if total == 0 || state.count_passed(learner, course) != total {
                return Err(CredentialError::NotCompleted(format!(
                    "not every lesson of '{course_slug}' is passed"
                )));
            }

            let title = if course_title.trim().is_empty() {
                course.title.clone()
            } else {
                course_title.to_string()
            };
            let cert = CertificateBuilder::new(
                learner.clone(),
                principal.name(),
                course.id.clone(),
                course_slug,
                title,
            )
            .issuer(self.config.issuer_name.clone())
            .verification(verification_id.clone(), verification_url.clone())
            .status(status)
            .seal(&self.signer, now);

            state.insert_certificate(cert.clone())?;
            Ok(Created::New(cert))
        })?;

        let mut cert = match created {
            Created::Existing(cert) => {
                info!("certificate for {learner} in '{course_slug}' already exists: {}", cert.id);
                return Ok(Issuance::AlreadyExists(cert));
            }
            Created::New(cert) => cert,
        };
        info!(
            "issued {} to {learner} for '{course_slug}' ({})",
            cert.id, cert.status
        );

        match self.publisher.publish(&cert).await {
            Ok(uri) => match self.set_metadata_uri(&cert.id, &uri) {
                Ok(updated) => cert = updated,
                Err(e) => warn!("could not record metadata URI for {}: {e}", cert.id),
            },
            Err(e) => warn!("metadata publication for {} failed: {e}", cert.id),
        }

        let mint = if policy.mints_on_issue() {
            MintDispatch::Scheduled(self.minter.spawn(cert.id.clone()))
        } else {
            MintDispatch::NotRequested
        };

        Ok(Issuance::Created {
            certificate: cert,
            mint,
        })
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    /// Apply `verify`, `revoke` or `restore`. Admin only, and the caller must
    /// have confirmed the action.
    pub fn apply_action(
        &self,
        principal: Option<&Principal>,
        id: &CertificateId,
        action: CertificateAction,
        confirmed: bool,
    ) -> Result<Certificate> {
        require_admin(principal)?;
        require_confirmation(confirmed, action.as_str(), id)?;
        let now = self.clock.now_micros();

        let cert = self.store.transaction(|state| {
            let mut cert = state
                .certificate(id)
                .cloned()
                .ok_or_else(|| CredentialError::NotFound(format!("certificate {id}")))?;
            let next = cert.status.apply(action)?;
            if next != cert.status {
                cert.status = next;
                cert.status_changed_at = now;
                state.update_certificate(cert.clone())?;
            }
            Ok(cert)
        })?;
        info!("{} {id}: now {}", action.as_str(), cert.status);
        Ok(cert)
    }

    /// Mint a verified certificate now. Waits for confirmation.
    pub async fn trigger_mint(
        &self,
        principal: Option<&Principal>,
        id: &CertificateId,
        confirmed: bool,
    ) -> Result<MintOutcome> {
        require_admin(principal)?;
        require_confirmation(confirmed, "mint", id)?;

        let cert = self.load(id)?;
        if cert.is_minted() {
            return Ok(MintOutcome::AlreadyMinted(cert));
        }
        if cert.status != CertificateStatus::Verified {
            return Err(CredentialError::InvalidTransition {
                from: cert.status.as_str().to_string(),
                action: "mint".to_string(),
            });
        }
        if self.minter.recipient().is_empty() {
            return Err(CredentialError::Config(
                "no organization wallet configured".into(),
            ));
        }
        let Some(uri) = cert.metadata_uri.as_deref() else {
            return Err(CredentialError::Validation(format!(
                "certificate {id} has no published metadata; refresh it before minting"
            )));
        };
        self.minter.mint(id, Some(uri)).await
    }

    /// Republish the descriptor over the current one and store the new URI.
    pub async fn refresh_metadata(
        &self,
        principal: Option<&Principal>,
        id: &CertificateId,
    ) -> Result<Certificate> {
        require_admin(principal)?;
        let cert = self.load(id)?;
        let uri = self
            .publisher
            .update(&cert, cert.metadata_uri.as_deref())
            .await?;
        self.set_metadata_uri(id, &uri)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// A certificate visible to its owner or an admin.
    pub fn get(&self, principal: Option<&Principal>, id: &CertificateId) -> Result<Certificate> {
        let principal = authenticated(principal)?;
        let cert = self.load(id)?;
        if cert.student_id != principal.learner_id && !principal.roles.is_admin() {
            return Err(CredentialError::Forbidden(format!(
                "certificate {id} belongs to another learner"
            )));
        }
        Ok(cert)
    }

    /// The principal's own certificates.
    pub fn list_for_student(&self, principal: Option<&Principal>) -> Result<Vec<Certificate>> {
        let principal = authenticated(principal)?;
        self.store.read(|s| {
            s.certificates_for_student(&principal.learner_id)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Public lookup by verification token. No session is needed.
    pub fn lookup(&self, verification_id: &str) -> Result<CertificateVerification> {
        let cert = self
            .store
            .read(|s| s.certificate_by_verification_id(verification_id).cloned())?
            .ok_or_else(|| CredentialError::NotFound("no certificate for this verification id".into()))?;
        let errors = check_seal(&cert, Some(self.signer.verifying_key()));
        let seal_valid = errors.is_empty();
        Ok(CertificateVerification {
            seal_valid,
            minted: cert.is_minted(),
            is_authoritative: seal_valid && cert.status == CertificateStatus::Verified,
            checked_at: self.clock.now_micros(),
            errors,
            certificate: cert,
        })
    }

    fn load(&self, id: &CertificateId) -> Result<Certificate> {
        self.store
            .read(|s| s.certificate(id).cloned())?
            .ok_or_else(|| CredentialError::NotFound(format!("certificate {id}")))
    }

    fn set_metadata_uri(&self, id: &CertificateId, uri: &str) -> Result<Certificate> {
        self.store.transaction(|state| {
            let mut cert = state
                .certificate(id)
                .cloned()
                .ok_or_else(|| CredentialError::NotFound(format!("certificate {id}")))?;
            cert.metadata_uri = Some(uri.to_string());
            state.update_certificate(cert.clone())?;
            Ok(cert)
        })
    }
}

fn require_admin(principal: Option<&Principal>) -> Result<&Principal> {
    let principal = authenticated(principal)?;
    principal.roles.require(Role::Admin)?;
    Ok(principal)
}

fn require_confirmation(confirmed: bool, action: &str, id: &CertificateId) -> Result<()> {
    if confirmed {
        Ok(())
    } else {
        Err(CredentialError::ConfirmationRequired(format!(
            "{action} of {id} must be confirmed"
        )))
    }
}
