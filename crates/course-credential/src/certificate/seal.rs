//! Certificate sealing — the tamper-evident part of a certificate.
//!
//! The immutable fields are hashed into `record_hash`, the hash is signed with
//! the organization key, and the certificate id is derived from the hash.
//! Status, metadata and ledger fields change over the certificate's life and
//! are not covered.

use ed25519_dalek::VerifyingKey;

use crate::course::CourseId;
use crate::crypto::keys::verifying_key_from_base64;
use crate::crypto::signing::{digest_fields, id_from_digest, verify_from_base64};
use crate::crypto::OrgKeyPair;
use crate::principal::LearnerId;

use super::types::{Certificate, CertificateId, CertificateStatus};

/// Builder for sealed certificates.
pub struct CertificateBuilder {
    student_id: LearnerId,
    student_name: String,
    course_id: CourseId,
    course_slug: String,
    course_title: String,
    issuer: String,
    verification_id: String,
    verification_url: String,
    status: CertificateStatus,
}

impl CertificateBuilder {
    /// Start building a certificate for a student and course.
    pub fn new(
        student_id: LearnerId,
        student_name: impl Into<String>,
        course_id: CourseId,
        course_slug: impl Into<String>,
        course_title: impl Into<String>,
    ) -> Self {
        Self {
            student_id,
            student_name: student_name.into(),
            course_id,
            course_slug: course_slug.into(),
            course_title: course_title.into(),
            issuer: String::new(),
            verification_id: String::new(),
            verification_url: String::new(),
            status: CertificateStatus::Pending,
        }
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set the public verification token and the URL derived from it.
    pub fn verification(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.verification_id = id.into();
        self.verification_url = url.into();
        self
    }

    pub fn status(mut self, status: CertificateStatus) -> Self {
        self.status = status;
        self
    }

    /// Seal and finalize the certificate at `issued_at`.
    pub fn seal(self, key: &OrgKeyPair, issued_at: u64) -> Certificate {
        let mut cert = Certificate {
            id: CertificateId(String::new()),
            student_id: self.student_id,
            student_name: self.student_name,
            course_id: self.course_id,
            course_slug: self.course_slug,
            course_title: self.course_title,
            issuer: self.issuer,
            issued_at,
            verification_id: self.verification_id,
            verification_url: self.verification_url,
            status: self.status,
            status_changed_at: issued_at,
            metadata_uri: None,
            blockchain_tx: None,
            blockchain_contract: None,
            blockchain_network: None,
            minted_at: None,
            record_hash: String::new(),
            signer_key: key.public_key_base64(),
            signature: String::new(),
        };

        cert.record_hash = compute_record_hash(&cert);
        cert.id = CertificateId(id_from_digest("cert", &cert.record_hash));
        cert.signature = key.sign_base64(cert.record_hash.as_bytes());
        cert
    }
}

/// Recompute the hash of a certificate's immutable fields.
pub fn compute_record_hash(cert: &Certificate) -> String {
    let issued = cert.issued_at.to_string();
    digest_fields(&[
        &cert.student_id.0,
        &cert.student_name,
        &cert.course_id.0,
        &cert.course_slug,
        &cert.course_title,
        &cert.issuer,
        &issued,
        &cert.verification_id,
        &cert.verification_url,
        &cert.signer_key,
    ])
}

/// Check a certificate's seal, returning every problem found.
///
/// When `trusted_key` is given the seal must also come from that key.
pub fn check_seal(cert: &Certificate, trusted_key: Option<&VerifyingKey>) -> Vec<String> {
    let mut errors = Vec::new();

    let recomputed = compute_record_hash(cert);
    if recomputed != cert.record_hash {
        errors.push("Record hash mismatch: certificate fields were altered".to_string());
    }
    if id_from_digest("cert", &cert.record_hash) != cert.id.0 {
        errors.push("Certificate id does not match record hash".to_string());
    }

    match verifying_key_from_base64(&cert.signer_key) {
        Ok(key) => {
            if let Some(trusted) = trusted_key {
                if trusted != &key {
                    errors.push("Certificate was not sealed by the trusted key".to_string());
                }
            }
            if verify_from_base64(&key, cert.record_hash.as_bytes(), &cert.signature).is_err() {
                errors.push("Signature verification failed".to_string());
            }
        }
        Err(e) => errors.push(format!("Invalid signer key: {e}")),
    }

    errors
}
