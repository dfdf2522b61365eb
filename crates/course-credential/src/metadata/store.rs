//! Content-addressed stores for descriptor documents.
//!
//! Documents are addressed by a CIDv1 over their canonical JSON bytes
//! (sha2-256 multihash, json codec) and referenced as `ipfs://<cid>`. The
//! address changes whenever the content does.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cid::multihash::Multihash;
use cid::Cid;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{CredentialError, Result};

/// Multicodec code for JSON documents.
const JSON_CODEC: u64 = 0x0200;

/// Multihash code for sha2-256.
const SHA2_256: u64 = 0x12;

const URI_SCHEME: &str = "ipfs://";

/// A content-addressed document store.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store `doc` and return its `ipfs://` URI.
    async fn pin_json(&self, doc: &Value) -> Result<String>;

    /// Fetch the document a URI points to.
    async fn fetch(&self, uri: &str) -> Result<Value>;
}

/// Canonical bytes of a document. Object keys serialize in sorted order.
pub fn canonical_bytes(doc: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| CredentialError::SerializationError(e.to_string()))
}

/// CIDv1 of `bytes`.
pub fn content_cid(bytes: &[u8]) -> Result<Cid> {
    let digest = Multihash::<64>::wrap(SHA2_256, &Sha256::digest(bytes))
        .map_err(|e| CredentialError::SerializationError(format!("multihash: {e}")))?;
    Ok(Cid::new_v1(JSON_CODEC, digest))
}

pub fn uri_for(cid: &Cid) -> String {
    format!("{URI_SCHEME}{cid}")
}

/// Parse an `ipfs://<cid>` URI (a bare CID is accepted too).
pub fn parse_ipfs_uri(uri: &str) -> Result<Cid> {
    let raw = uri.strip_prefix(URI_SCHEME).unwrap_or(uri);
    let raw = raw.split('/').next().unwrap_or(raw);
    raw.parse::<Cid>()
        .map_err(|e| CredentialError::Validation(format!("invalid content address '{uri}': {e}")))
}

fn verify_content(cid: &Cid, bytes: &[u8]) -> Result<Value> {
    if content_cid(bytes)? != *cid {
        return Err(CredentialError::ExternalService(format!(
            "content for {cid} does not match its address"
        )));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| CredentialError::ExternalService(format!("document {cid} is not JSON: {e}")))
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store for tests and ephemeral pipelines.
///
/// Can be switched offline to simulate an unreachable service.
#[derive(Default)]
pub struct MemoryContentStore {
    docs: RwLock<HashMap<Cid, Vec<u8>>>,
    offline: AtomicBool,
    pins: AtomicUsize,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Successful pin calls so far.
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CredentialError::ExternalService(
                "metadata store unavailable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryContentStore {
    async fn pin_json(&self, doc: &Value) -> Result<String> {
        self.check_online()?;
        let bytes = canonical_bytes(doc)?;
        let cid = content_cid(&bytes)?;
        self.docs.write().await.insert(cid, bytes);
        self.pins.fetch_add(1, Ordering::SeqCst);
        Ok(uri_for(&cid))
    }

    async fn fetch(&self, uri: &str) -> Result<Value> {
        self.check_online()?;
        let cid = parse_ipfs_uri(uri)?;
        let docs = self.docs.read().await;
        let bytes = docs
            .get(&cid)
            .ok_or_else(|| CredentialError::NotFound(format!("document {uri}")))?;
        verify_content(&cid, bytes)
    }
}

// ============================================================================
// Directory store
// ============================================================================

/// Documents stored as `{cid}.json` files in one directory.
pub struct LocalContentStore {
    dir: PathBuf,
}

impl LocalContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, cid: &Cid) -> PathBuf {
        self.dir.join(format!("{cid}.json"))
    }
}

#[async_trait::async_trait]
impl MetadataStore for LocalContentStore {
    async fn pin_json(&self, doc: &Value) -> Result<String> {
        let bytes = canonical_bytes(doc)?;
        let cid = content_cid(&bytes)?;
        let path = self.path_for(&cid);
        if !path.exists() {
            // Each writer stages its own temp file; identical content makes
            // the final rename safe to repeat.
            let dir = self.dir.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
                tmp.write_all(&bytes)?;
                tmp.persist(&path).map_err(|e| CredentialError::from(e.error))?;
                Ok(())
            })
            .await
            .map_err(|e| CredentialError::StorageError(format!("pin task: {e}")))??;
        }
        Ok(uri_for(&cid))
    }

    async fn fetch(&self, uri: &str) -> Result<Value> {
        let cid = parse_ipfs_uri(uri)?;
        let path = self.path_for(&cid);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::NotFound(format!("document {uri}")))
            }
            Err(e) => return Err(e.into()),
        };
        verify_content(&cid, &bytes)
    }
}

// ============================================================================
// Remote pinning service
// ============================================================================

/// A hosted pinning service with a `pinJSONToIPFS` endpoint and a read gateway.
pub struct PinningServiceStore {
    api_url: String,
    gateway_url: String,
    token: String,
    http_client: reqwest::Client,
}

impl PinningServiceStore {
    pub fn new(api_url: &str, gateway_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialError::Config(format!("http client: {e}")))?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            token,
            http_client,
        })
    }

    /// Build from configuration, reading the bearer token from `token_env`.
    pub fn from_env(api_url: &str, gateway_url: &str, token_env: &str) -> Result<Self> {
        let token = std::env::var(token_env)
            .map_err(|_| CredentialError::Config(format!("{token_env} is not set")))?;
        Self::new(api_url, gateway_url, token, Duration::from_secs(30))
    }
}

#[derive(serde::Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[async_trait::async_trait]
impl MetadataStore for PinningServiceStore {
    async fn pin_json(&self, doc: &Value) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "pinataContent": doc }))
            .send()
            .await
            .map_err(|e| CredentialError::ExternalService(format!("pin request: {e}")))?;
        if !response.status().is_success() {
            return Err(CredentialError::ExternalService(format!(
                "pinning service returned {}",
                response.status()
            )));
        }
        let body: PinResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::ExternalService(format!("pin response: {e}")))?;
        let cid = parse_ipfs_uri(&body.ipfs_hash)?;
        Ok(uri_for(&cid))
    }

    async fn fetch(&self, uri: &str) -> Result<Value> {
        let cid = parse_ipfs_uri(uri)?;
        let response = self
            .http_client
            .get(format!("{}/ipfs/{cid}", self.gateway_url))
            .send()
            .await
            .map_err(|e| CredentialError::ExternalService(format!("gateway request: {e}")))?;
        if !response.status().is_success() {
            return Err(CredentialError::ExternalService(format!(
                "gateway returned {} for {uri}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CredentialError::ExternalService(format!("gateway body: {e}")))
    }
}
