//! Certificates: sealed records, the verification state machine, and the
//! issuer that creates and administers them.

pub mod issuer;
pub mod seal;
pub mod types;

pub use issuer::CertificateIssuer;
pub use seal::{check_seal, compute_record_hash, CertificateBuilder};
pub use types::{
    Certificate, CertificateAction, CertificateId, CertificateStatus, CertificateVerification,
    Issuance, MintDispatch, PlatformPolicy,
};
