//! Certificate descriptor documents and the content-addressed stores that
//! hold them.

use std::path::Path;
use std::sync::Arc;

use crate::config::MetadataConfig;
use crate::error::Result;

pub mod descriptor;
pub mod publisher;
pub mod store;

pub use descriptor::{merge_shallow, CertificateDescriptor, MetadataAttribute};
pub use publisher::MetadataPublisher;
pub use store::{
    content_cid, parse_ipfs_uri, LocalContentStore, MemoryContentStore, MetadataStore,
    PinningServiceStore,
};

/// Open the store a configuration names. `local_dir` holds documents for the
/// local backend.
pub fn store_from_config(config: &MetadataConfig, local_dir: &Path) -> Result<Arc<dyn MetadataStore>> {
    Ok(match config {
        MetadataConfig::Local => Arc::new(LocalContentStore::new(local_dir)?),
        MetadataConfig::PinningService {
            api_url,
            gateway_url,
            token_env,
        } => Arc::new(PinningServiceStore::from_env(api_url, gateway_url, token_env)?),
    })
}
