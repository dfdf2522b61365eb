//! Error types for the credential pipeline.
//!
//! All errors are strongly typed and propagated without panicking.
//! Key material is never included in error messages. A duplicate
//! certificate request is not an error: it resolves to the existing record.

/// Pipeline error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Quiz already passed")]
    AlreadyPassed,

    #[error("Course not completed: {0}")]
    NotCompleted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Too many attempts: quiz locked until {unlock_at}")]
    RateLimited {
        /// Unlock time, microseconds since Unix epoch.
        locked_until: u64,
        /// Unlock time as RFC 3339.
        unlock_at: String,
    },

    #[error("Cannot {action} a certificate in state {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid passphrase")]
    InvalidPassphrase,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CredentialError {
    /// Build a rate-limit error for a lock expiring at `locked_until`.
    pub fn rate_limited(locked_until: u64) -> Self {
        Self::RateLimited {
            locked_until,
            unlock_at: crate::time::micros_to_rfc3339(locked_until),
        }
    }

    /// HTTP-equivalent status code for surfacing the error to a caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Forbidden(_) | Self::AlreadyPassed | Self::NotCompleted(_) => 403,
            Self::NotFound(_) => 404,
            Self::InvalidTransition { .. } => 409,
            Self::Validation(_) => 422,
            Self::ConfirmationRequired(_) => 428,
            Self::RateLimited { .. } => 429,
            Self::ExternalService(_) => 502,
            _ => 500,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CredentialError>;
