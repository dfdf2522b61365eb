//! A single-node ledger: an append-only, hash-chained log of mint entries,
//! each signed by the organization key.
//!
//! Entries are confirmed as soon as they are appended, so
//! `wait_for_receipt` returns immediately. The log can be persisted to a
//! JSON file and its integrity checked with [`verify_chain`].

use std::path::PathBuf;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::crypto::keys::verifying_key_from_base64;
use crate::crypto::signing::{digest_fields, verify_from_base64};
use crate::crypto::OrgKeyPair;
use crate::error::{CredentialError, Result};
use crate::storage::write_atomic;
use crate::time::Clock;

use super::types::{LedgerClient, PendingTx, TxReceipt, TxStatus};

const LEDGER_FILE_VERSION: u32 = 1;

/// One recorded mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 0-based position; also the token id.
    pub sequence: u64,
    pub previous_hash: Option<String>,
    pub recipient: String,
    pub metadata_uri: String,
    pub network: String,
    pub contract: String,
    pub recorded_at: u64,
    pub entry_hash: String,
    pub signer_key: String,
    pub signature: String,
}

impl LedgerEntry {
    pub fn tx_hash(&self) -> String {
        format!("0x{}", self.entry_hash)
    }

    pub fn block_number(&self) -> u64 {
        self.sequence + 1
    }

    fn compute_hash(&self) -> String {
        digest_fields(&[
            &self.sequence.to_string(),
            self.previous_hash.as_deref().unwrap_or(""),
            &self.recipient,
            &self.metadata_uri,
            &self.network,
            &self.contract,
            &self.recorded_at.to_string(),
            &self.signer_key,
        ])
    }
}

#[derive(Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    entries: Vec<LedgerEntry>,
}

pub struct LocalLedger {
    path: Option<PathBuf>,
    signer: Arc<OrgKeyPair>,
    network: String,
    contract: String,
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl LocalLedger {
    pub fn in_memory(
        signer: Arc<OrgKeyPair>,
        network: impl Into<String>,
        contract: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            path: None,
            signer,
            network: network.into(),
            contract: contract.into(),
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Open a persisted ledger, starting empty if the file does not exist.
    pub fn open(
        path: impl Into<PathBuf>,
        signer: Arc<OrgKeyPair>,
        network: impl Into<String>,
        contract: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            read_entries(&path)?
        } else {
            Vec::new()
        };
        let mut ledger = Self::in_memory(signer, network, contract, clock);
        ledger.path = Some(path);
        ledger.entries = Mutex::new(entries);
        Ok(ledger)
    }

    /// Snapshot of all entries, oldest first.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().await.clone()
    }

    /// Verify this ledger's chain against its own signing key.
    pub async fn verify(&self) -> Result<usize> {
        let entries = self.entries.lock().await;
        verify_chain(&entries, Some(self.signer.verifying_key()))?;
        Ok(entries.len())
    }
}

/// Read the entries of a persisted ledger file.
pub fn read_entries(path: &std::path::Path) -> Result<Vec<LedgerEntry>> {
    let bytes = std::fs::read(path)?;
    let file: LedgerFile = serde_json::from_slice(&bytes).map_err(|e| {
        CredentialError::InvalidFileFormat(format!("failed to parse ledger file: {e}"))
    })?;
    if file.version != LEDGER_FILE_VERSION {
        return Err(CredentialError::InvalidFileFormat(format!(
            "unsupported ledger version {}",
            file.version
        )));
    }
    Ok(file.entries)
}

/// Verify a ledger chain, oldest entry first.
///
/// Every entry must hash to its `entry_hash`, carry a valid signature by its
/// `signer_key` (and by `trusted` when given), and link to its predecessor.
pub fn verify_chain(entries: &[LedgerEntry], trusted: Option<&VerifyingKey>) -> Result<()> {
    let mut previous: Option<&LedgerEntry> = None;
    for entry in entries {
        let expected_seq = previous.map(|p| p.sequence + 1).unwrap_or(0);
        if entry.sequence != expected_seq {
            return Err(CredentialError::Validation(format!(
                "ledger entry {} out of sequence, expected {expected_seq}",
                entry.sequence
            )));
        }
        if entry.previous_hash.as_deref() != previous.map(|p| p.entry_hash.as_str()) {
            return Err(CredentialError::Validation(format!(
                "ledger entry {} does not link to its predecessor",
                entry.sequence
            )));
        }
        if entry.compute_hash() != entry.entry_hash {
            return Err(CredentialError::Validation(format!(
                "ledger entry {} hash mismatch",
                entry.sequence
            )));
        }
        let key = verifying_key_from_base64(&entry.signer_key)?;
        if let Some(trusted) = trusted {
            if &key != trusted {
                return Err(CredentialError::SignatureInvalid);
            }
        }
        verify_from_base64(&key, entry.entry_hash.as_bytes(), &entry.signature)?;
        previous = Some(entry);
    }
    Ok(())
}

#[async_trait::async_trait]
impl LedgerClient for LocalLedger {
    fn network(&self) -> &str {
        &self.network
    }

    fn contract(&self) -> &str {
        &self.contract
    }

    async fn submit_mint(&self, recipient: &str, metadata_uri: &str) -> Result<PendingTx> {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now_micros();
        let mut entry = LedgerEntry {
            sequence: entries.len() as u64,
            previous_hash: entries.last().map(|e| e.entry_hash.clone()),
            recipient: recipient.to_string(),
            metadata_uri: metadata_uri.to_string(),
            network: self.network.clone(),
            contract: self.contract.clone(),
            recorded_at: now,
            entry_hash: String::new(),
            signer_key: self.signer.public_key_base64(),
            signature: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        entry.signature = self.signer.sign_base64(entry.entry_hash.as_bytes());
        let tx_hash = entry.tx_hash();

        let mut next = entries.clone();
        next.push(entry);
        if let Some(path) = &self.path {
            let file = LedgerFile {
                version: LEDGER_FILE_VERSION,
                entries: next,
            };
            let json = serde_json::to_string_pretty(&file)
                .map_err(|e| CredentialError::SerializationError(e.to_string()))?;
            write_atomic(path, json.as_bytes())?;
            *entries = file.entries;
        } else {
            *entries = next;
        }

        Ok(PendingTx {
            tx_hash,
            submitted_at: now,
        })
    }

    async fn wait_for_receipt(&self, tx: &PendingTx) -> Result<TxReceipt> {
        let entries = self.entries.lock().await;
        let entry = entries
            .iter()
            .find(|e| e.tx_hash() == tx.tx_hash)
            .ok_or_else(|| {
                CredentialError::ExternalService(format!("unknown transaction {}", tx.tx_hash))
            })?;
        Ok(TxReceipt {
            tx_hash: tx.tx_hash.clone(),
            block_number: entry.block_number(),
            contract: self.contract.clone(),
            network: self.network.clone(),
            status: TxStatus::Success,
        })
    }
}
