//! Records certificates on the ledger, at most once each.
//!
//! The minter never writes partial ledger fields: the transaction hash,
//! contract, network and mint time are stored together after confirmation or
//! not at all. Confirmation can take minutes, so issuance runs it on a
//! background task ([`ChainMinter::spawn`]) and returns right away.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::certificate::{Certificate, CertificateId, CertificateStatus};
use crate::error::{CredentialError, Result};
use crate::metadata::MetadataPublisher;
use crate::storage::JsonStore;
use crate::time::Clock;

use super::types::{LedgerClient, MintOutcome, TxReceipt, TxStatus};

/// A background mint started at issuance.
#[derive(Debug)]
pub struct MintTask {
    certificate_id: CertificateId,
    handle: JoinHandle<Result<MintOutcome>>,
}

impl MintTask {
    pub fn certificate_id(&self) -> &CertificateId {
        &self.certificate_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the mint to finish.
    pub async fn join(self) -> Result<MintOutcome> {
        self.handle.await.map_err(|e| {
            CredentialError::ExternalService(format!(
                "mint task for {} aborted: {e}",
                self.certificate_id
            ))
        })?
    }
}

/// Removes a certificate from the in-flight set when the mint ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<CertificateId>>,
    id: CertificateId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

pub struct ChainMinter {
    store: Arc<JsonStore>,
    publisher: Arc<MetadataPublisher>,
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    /// Organization wallet that holds every minted credential.
    recipient: String,
    confirmation_timeout: Duration,
    in_flight: Mutex<HashSet<CertificateId>>,
}

impl ChainMinter {
    pub fn new(
        store: Arc<JsonStore>,
        publisher: Arc<MetadataPublisher>,
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        recipient: impl Into<String>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            ledger,
            clock,
            recipient: recipient.into(),
            confirmation_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Start minting on a background task.
    pub fn spawn(self: &Arc<Self>, certificate_id: CertificateId) -> MintTask {
        let minter = Arc::clone(self);
        let id = certificate_id.clone();
        let handle = tokio::spawn(async move { minter.mint(&id, None).await });
        MintTask {
            certificate_id,
            handle,
        }
    }

    /// Mint a certificate, publishing its metadata first if no URI is known.
    ///
    /// Returns `Err` only when the certificate cannot be read or written;
    /// ledger and metadata failures come back as [`MintOutcome::Failed`].
    pub async fn mint(&self, id: &CertificateId, metadata_uri: Option<&str>) -> Result<MintOutcome> {
        let cert = self.load(id)?;
        if cert.is_minted() {
            return Ok(MintOutcome::AlreadyMinted(cert));
        }

        let _guard = match self.claim(id)? {
            Some(guard) => guard,
            None => return Ok(MintOutcome::InProgress(cert)),
        };

        // A concurrent mint may have finished between the first read and the claim.
        let cert = self.load(id)?;
        if cert.is_minted() {
            return Ok(MintOutcome::AlreadyMinted(cert));
        }

        let uri = match metadata_uri
            .map(str::to_string)
            .or_else(|| cert.metadata_uri.clone())
        {
            Some(uri) => uri,
            None => match self.publisher.publish(&cert).await {
                Ok(uri) => {
                    self.store_metadata_uri(id, &uri)?;
                    uri
                }
                Err(e) => return self.failed(id, format!("metadata publication failed: {e}")),
            },
        };

        // TODO: persist the pending tx hash so a retry after a timeout can poll
        // it instead of submitting a second mint.
        let confirmed = tokio::time::timeout(self.confirmation_timeout, async {
            let pending = self.ledger.submit_mint(&self.recipient, &uri).await?;
            self.ledger.wait_for_receipt(&pending).await
        })
        .await;

        let receipt = match confirmed {
            Err(_) => {
                return self.failed(
                    id,
                    format!(
                        "no confirmation within {}s",
                        self.confirmation_timeout.as_secs()
                    ),
                )
            }
            Ok(Err(e)) => return self.failed(id, e.to_string()),
            Ok(Ok(receipt)) if receipt.status == TxStatus::Reverted => {
                return self.failed(id, format!("transaction {} reverted", receipt.tx_hash))
            }
            Ok(Ok(receipt)) => receipt,
        };

        let minted = self.record_mint(id, &uri, &receipt)?;
        info!(
            "minted {} in tx {} (block {})",
            id, receipt.tx_hash, receipt.block_number
        );
        Ok(MintOutcome::Minted(minted))
    }

    fn load(&self, id: &CertificateId) -> Result<Certificate> {
        self.store
            .read(|s| s.certificate(id).cloned())?
            .ok_or_else(|| CredentialError::NotFound(format!("certificate {id}")))
    }

    fn claim(&self, id: &CertificateId) -> Result<Option<InFlight<'_>>> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| CredentialError::StorageError("mint registry poisoned".into()))?;
        if !set.insert(id.clone()) {
            return Ok(None);
        }
        Ok(Some(InFlight {
            set: &self.in_flight,
            id: id.clone(),
        }))
    }

    fn store_metadata_uri(&self, id: &CertificateId, uri: &str) -> Result<()> {
        self.store.transaction(|s| {
            let mut cert = s
                .certificate(id)
                .cloned()
                .ok_or_else(|| CredentialError::NotFound(format!("certificate {id}")))?;
            cert.metadata_uri = Some(uri.to_string());
            s.update_certificate(cert)
        })
    }

    fn record_mint(&self, id: &CertificateId, uri: &str, receipt: &TxReceipt) -> Result<Certificate> {
        let now = self.clock.now_micros();
        self.store.transaction(|s| {
            let mut cert = s
                .certificate(id)
                .cloned()
                .ok_or_else(|| CredentialError::NotFound(format!("certificate {id}")))?;
            cert.blockchain_tx = Some(receipt.tx_hash.clone());
            cert.blockchain_contract = Some(receipt.contract.clone());
            cert.blockchain_network = Some(receipt.network.clone());
            cert.minted_at = Some(now);
            cert.metadata_uri = Some(uri.to_string());
            match cert.status {
                CertificateStatus::Revoked => {
                    warn!("{id} was revoked while its mint was confirming");
                }
                CertificateStatus::Pending => {
                    cert.status = CertificateStatus::Verified;
                    cert.status_changed_at = now;
                }
                CertificateStatus::Verified => {}
            }
            s.update_certificate(cert.clone())?;
            Ok(cert)
        })
    }

    fn failed(&self, id: &CertificateId, reason: String) -> Result<MintOutcome> {
        warn!("mint of {id} failed: {reason}");
        Ok(MintOutcome::Failed {
            certificate: self.load(id)?,
            reason,
        })
    }
}
