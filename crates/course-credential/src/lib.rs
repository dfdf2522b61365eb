//! CourseCredential — completion-to-credential pipeline for an online course
//! platform.
//!
//! Grades lesson quizzes under retry and cooldown rules, derives course
//! progress from lesson records, and issues sealed certificates that can be
//! published as content-addressed metadata and minted on a ledger by the
//! organization key.

pub mod certificate;
pub mod config;
pub mod course;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metadata;
pub mod pipeline;
pub mod principal;
pub mod progress;
pub mod quiz;
pub mod storage;
pub mod time;

// Re-export primary types
pub use error::{CredentialError, Result};
pub use pipeline::{AdminAction, AdminOutcome, CredentialPipeline, PipelineBuilder};
pub use principal::{LearnerId, Principal, Role, RoleSet};

pub use certificate::{
    Certificate, CertificateAction, CertificateId, CertificateStatus, CertificateVerification,
    Issuance, MintDispatch, PlatformPolicy,
};
pub use config::{GradingRules, LedgerConfig, MetadataConfig, PipelineConfig};
pub use course::{Course, CourseId, CourseModule, Lesson, LessonId, QuestionId, QuizQuestion};
pub use crypto::OrgKeyPair;
pub use ledger::{LedgerClient, LocalLedger, MintOutcome, MintTask};
pub use metadata::{LocalContentStore, MemoryContentStore, MetadataStore, PinningServiceStore};
pub use progress::{Enrollment, ProgressRecord};
pub use quiz::{QuizAttempt, QuizResult, QuizSubmission};
pub use storage::JsonStore;
pub use time::{Clock, ManualClock, SystemClock};
