//! Builds and publishes certificate descriptors.
//!
//! Publication is best-effort from the issuer's point of view: errors are
//! returned here and the caller decides whether to absorb them.

use std::sync::Arc;

use log::{info, warn};
use serde_json::{Map, Value};

use crate::certificate::Certificate;
use crate::error::Result;

use super::descriptor::{merge_shallow, CertificateDescriptor};
use super::store::MetadataStore;

pub struct MetadataPublisher {
    store: Arc<dyn MetadataStore>,
}

impl MetadataPublisher {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Publish a fresh descriptor and return its URI.
    pub async fn publish(&self, cert: &Certificate) -> Result<String> {
        let doc = CertificateDescriptor::for_certificate(cert).to_value()?;
        let uri = self.store.pin_json(&doc).await?;
        info!("published metadata for {} at {uri}", cert.id);
        Ok(uri)
    }

    /// Republish the descriptor over the document at `previous_uri`.
    ///
    /// The previous document is fetched best-effort; if it cannot be read the
    /// new descriptor is published on its own. The returned URI always differs
    /// from the previous one when the content changed, so callers must persist
    /// it.
    pub async fn update(&self, cert: &Certificate, previous_uri: Option<&str>) -> Result<String> {
        let base = match previous_uri {
            Some(uri) => match self.store.fetch(uri).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("previous metadata {uri} unavailable for {}: {e}", cert.id);
                    Value::Object(Map::new())
                }
            },
            None => Value::Object(Map::new()),
        };
        let fresh = CertificateDescriptor::for_certificate(cert).to_value()?;
        let merged = merge_shallow(base, fresh);
        let uri = self.store.pin_json(&merged).await?;
        info!("updated metadata for {}: {uri}", cert.id);
        Ok(uri)
    }
}
