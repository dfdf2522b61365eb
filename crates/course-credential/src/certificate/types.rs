//! Data structures for certificates.

use serde::{Deserialize, Serialize};

use crate::course::CourseId;
use crate::error::{CredentialError, Result};
use crate::ledger::MintTask;
use crate::principal::LearnerId;

// ---------------------------------------------------------------------------
// Identity and status
// ---------------------------------------------------------------------------

/// Unique identifier for a certificate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CertificateId(pub String);

impl std::fmt::Display for CertificateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verification state. Minted-ness is tracked separately by `blockchain_tx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Pending,
    Verified,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Revoked => "REVOKED",
        }
    }

    /// Apply an administrative action.
    ///
    /// ```text
    /// PENDING  --verify-->  VERIFIED
    /// REVOKED  --verify-->  VERIFIED
    /// any      --revoke-->  REVOKED
    /// REVOKED  --restore--> PENDING
    /// ```
    pub fn apply(self, action: CertificateAction) -> Result<Self> {
        use CertificateAction::*;
        use CertificateStatus::*;
        match (self, action) {
            (Pending | Revoked, Verify) => Ok(Verified),
            (_, Revoke) => Ok(Revoked),
            (Revoked, Restore) => Ok(Pending),
            (from, action) => Err(CredentialError::InvalidTransition {
                from: from.as_str().to_string(),
                action: action.as_str().to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateAction {
    Verify,
    Revoke,
    Restore,
}

impl CertificateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Revoke => "revoke",
            Self::Restore => "restore",
        }
    }
}

impl std::str::FromStr for CertificateAction {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verify" => Ok(Self::Verify),
            "revoke" => Ok(Self::Revoke),
            "restore" => Ok(Self::Restore),
            other => Err(CredentialError::Validation(format!(
                "unknown certificate action '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// The issued credential for a completed course. Unique per (student, course slug).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub student_id: LearnerId,
    pub student_name: String,
    pub course_id: CourseId,
    pub course_slug: String,
    pub course_title: String,
    pub issuer: String,
    pub issued_at: u64,
    /// Opaque public token; the only handle a third party needs.
    pub verification_id: String,
    pub verification_url: String,
    pub status: CertificateStatus,
    pub status_changed_at: u64,
    /// Most recent descriptor address. Changes on every republish.
    pub metadata_uri: Option<String>,
    /// Set if and only if a mint completed.
    pub blockchain_tx: Option<String>,
    pub blockchain_contract: Option<String>,
    pub blockchain_network: Option<String>,
    pub minted_at: Option<u64>,
    /// SHA-256 over the immutable fields.
    pub record_hash: String,
    /// Base64 public key of the sealing organization key.
    pub signer_key: String,
    /// Signature over `record_hash`.
    pub signature: String,
}

impl Certificate {
    pub fn is_minted(&self) -> bool {
        self.blockchain_tx.is_some()
    }
}

/// Administrative platform switches, read fresh for every issuance decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformPolicy {
    pub auto_verify_certificates: bool,
    pub blockchain_minting_enabled: bool,
}

impl PlatformPolicy {
    /// Minting runs at issuance only for auto-verified certificates.
    pub fn mints_on_issue(&self) -> bool {
        self.auto_verify_certificates && self.blockchain_minting_enabled
    }
}

// ---------------------------------------------------------------------------
// Issuance results
// ---------------------------------------------------------------------------

/// What happened to the ledger step of an issuance.
#[derive(Debug)]
pub enum MintDispatch {
    /// Policy did not ask for a mint.
    NotRequested,
    /// A background mint is running; await the task for its outcome.
    Scheduled(MintTask),
}

/// Result of `auto_issue`.
#[derive(Debug)]
pub enum Issuance {
    Created {
        certificate: Certificate,
        mint: MintDispatch,
    },
    /// The certificate already existed and is returned unchanged.
    AlreadyExists(Certificate),
}

impl Issuance {
    pub fn certificate(&self) -> &Certificate {
        match self {
            Self::Created { certificate, .. } => certificate,
            Self::AlreadyExists(certificate) => certificate,
        }
    }

    pub fn already_existed(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Split into the certificate and the pending mint task, if any.
    pub fn into_parts(self) -> (Certificate, Option<MintTask>) {
        match self {
            Self::Created {
                certificate,
                mint: MintDispatch::Scheduled(task),
            } => (certificate, Some(task)),
            Self::Created { certificate, .. } => (certificate, None),
            Self::AlreadyExists(certificate) => (certificate, None),
        }
    }
}

/// Result of a public verification lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateVerification {
    pub certificate: Certificate,
    pub seal_valid: bool,
    pub minted: bool,
    /// Seal valid and status VERIFIED.
    pub is_authoritative: bool,
    pub checked_at: u64,
    pub errors: Vec<String>,
}
