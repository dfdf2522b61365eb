//! The public descriptor document published for a certificate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::certificate::Certificate;
use crate::error::{CredentialError, Result};
use crate::time::micros_to_date;

/// One `{trait_type, value}` pair in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

impl MetadataAttribute {
    fn new(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

/// Descriptor document in the common token-metadata layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDescriptor {
    pub name: String,
    pub description: String,
    pub external_url: String,
    pub attributes: Vec<MetadataAttribute>,
}

impl CertificateDescriptor {
    pub fn for_certificate(cert: &Certificate) -> Self {
        Self {
            name: format!("{} Certificate", cert.course_title),
            description: format!(
                "Awarded to {} by {} for completing {}.",
                cert.student_name, cert.issuer, cert.course_title
            ),
            external_url: cert.verification_url.clone(),
            attributes: vec![
                MetadataAttribute::new("student", cert.student_name.clone()),
                MetadataAttribute::new("course", cert.course_title.clone()),
                MetadataAttribute::new("issuer", cert.issuer.clone()),
                MetadataAttribute::new("issuedDate", micros_to_date(cert.issued_at)),
                MetadataAttribute::new("verificationUrl", cert.verification_url.clone()),
            ],
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| CredentialError::SerializationError(e.to_string()))
    }
}

/// Overlay the top-level keys of `overlay` onto `base`.
///
/// Nested values are replaced whole. A non-object base is discarded.
pub fn merge_shallow(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}
