//! Pipeline configuration.
//!
//! Loaded from a JSON file; every field has a default so an empty or absent
//! file yields a working single-node setup. Platform policy (auto-verify,
//! minting) is deliberately not here: it is administrative state read from the
//! store on every issuance decision.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, Result};
use crate::time::MICROS_PER_HOUR;

/// Longest cooldown a configuration may ask for (one year).
pub const MAX_COOLDOWN_HOURS: u64 = 24 * 365;

/// Quiz grading rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingRules {
    /// Minimum score (0-100) that counts as a pass.
    pub pass_threshold: u8,
    /// Failed attempts allowed before a cooldown lock.
    pub max_attempts: u32,
    /// Length of the cooldown lock.
    pub cooldown_hours: u64,
}

impl GradingRules {
    /// Cooldown length in microseconds.
    pub fn cooldown_micros(&self) -> u64 {
        self.cooldown_hours.saturating_mul(MICROS_PER_HOUR)
    }

    /// When a lock placed at `now` expires. Saturates instead of wrapping so
    /// an oversized cooldown can never produce a lock that is already over.
    pub fn lock_expiry(&self, now: u64) -> u64 {
        now.saturating_add(self.cooldown_micros())
    }
}

impl Default for GradingRules {
    fn default() -> Self {
        Self {
            pass_threshold: 70,
            max_attempts: 3,
            cooldown_hours: 8,
        }
    }
}

/// Where certificate descriptors are published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum MetadataConfig {
    /// Content-addressed files under the pipeline home directory.
    #[default]
    Local,
    /// A remote pinning service speaking the `pinJSONToIPFS` API.
    PinningService {
        api_url: String,
        gateway_url: String,
        /// Environment variable holding the bearer token.
        token_env: String,
    },
}

/// Ledger settings used by the minter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub network: String,
    pub contract: String,
    /// Organization wallet that holds minted credentials. When unset the
    /// fingerprint of the organization signing key is used.
    pub org_wallet: Option<String>,
    pub confirmation_timeout_secs: u64,
}

impl LedgerConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: "local".to_string(),
            contract: "credential-registry".to_string(),
            org_wallet: None,
            confirmation_timeout_secs: 120,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grading: GradingRules,
    /// Issuer name written into certificate descriptors.
    pub issuer_name: String,
    /// Base of the public verification URL; the verification id is appended.
    pub verification_base_url: String,
    pub metadata: MetadataConfig,
    pub ledger: LedgerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grading: GradingRules::default(),
            issuer_name: "Course Platform".to_string(),
            verification_base_url: "https://localhost/verify".to_string(),
            metadata: MetadataConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| CredentialError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CredentialError::SerializationError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values that would make grading or minting meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.grading.pass_threshold > 100 {
            return Err(CredentialError::Config(format!(
                "pass_threshold must be 0-100, got {}",
                self.grading.pass_threshold
            )));
        }
        if self.grading.max_attempts == 0 {
            return Err(CredentialError::Config("max_attempts must be >= 1".into()));
        }
        if self.grading.cooldown_hours > MAX_COOLDOWN_HOURS {
            return Err(CredentialError::Config(format!(
                "cooldown_hours must be at most {MAX_COOLDOWN_HOURS}, got {}",
                self.grading.cooldown_hours
            )));
        }
        if self.ledger.confirmation_timeout_secs == 0 {
            return Err(CredentialError::Config(
                "confirmation_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Public verification URL for a verification id.
    pub fn verification_url(&self, verification_id: &str) -> String {
        format!(
            "{}/{}",
            self.verification_base_url.trim_end_matches('/'),
            verification_id
        )
    }
}
