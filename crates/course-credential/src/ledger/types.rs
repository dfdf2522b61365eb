//! Ledger collaborator interface and mint results.

use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;
use crate::error::Result;

/// A submitted, not yet confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_hash: String,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Reverted,
}

/// Confirmation of a transaction's inclusion in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub contract: String,
    pub network: String,
    pub status: TxStatus,
}

/// A ledger reachable through RPC with a signing key behind it.
///
/// Implementations sign with the organization key; the recipient is the
/// organization's own wallet.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    fn network(&self) -> &str;

    fn contract(&self) -> &str;

    /// Submit a mint recording `metadata_uri` for `recipient`.
    async fn submit_mint(&self, recipient: &str, metadata_uri: &str) -> Result<PendingTx>;

    /// Wait until the transaction is included in a block.
    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt>;
}

/// How a mint request ended. Ledger trouble is reported as [`MintOutcome::Failed`]
/// rather than an error: the certificate itself is fine, just unminted.
#[derive(Debug, Clone)]
pub enum MintOutcome {
    /// Confirmed and recorded on the certificate.
    Minted(Certificate),
    /// The certificate already carried a transaction; nothing was submitted.
    AlreadyMinted(Certificate),
    /// Another task is minting this certificate right now.
    InProgress(Certificate),
    /// Verified but unminted; a retry is required.
    Failed {
        certificate: Certificate,
        reason: String,
    },
}

impl MintOutcome {
    /// The certificate as stored after the attempt.
    pub fn certificate(&self) -> &Certificate {
        match self {
            Self::Minted(c) | Self::AlreadyMinted(c) | Self::InProgress(c) => c,
            Self::Failed { certificate, .. } => certificate,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label for logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Minted(_) => "minted",
            Self::AlreadyMinted(_) => "already minted",
            Self::InProgress(_) => "mint in progress",
            Self::Failed { .. } => "verified, mint failed: retry required",
        }
    }
}
