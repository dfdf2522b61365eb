//! The organization signing key.
//!
//! A single Ed25519 key controlled by the platform seals every certificate
//! and signs every ledger submission. The organization, not the learner, is
//! the on-chain holder of record.

use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{CredentialError, Result};

use super::signing;

/// The organization's Ed25519 key pair.
///
/// The signing key is zeroized on drop to prevent private key leakage.
pub struct OrgKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl OrgKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a key pair from raw signing key bytes.
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Return a reference to the signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Return the verifying (public) key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Return the signing key bytes. Caller must zeroize after use.
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Public key as standard base64.
    pub fn public_key_base64(&self) -> String {
        base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            self.verifying_key.to_bytes(),
        )
    }

    /// Short, stable fingerprint of the public key (`org_<base58>`).
    ///
    /// Doubles as the organization's wallet-style address on the local ledger.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.verifying_key)
    }

    /// Sign `message`, returning a base64 signature.
    pub fn sign_base64(&self, message: &[u8]) -> String {
        signing::sign_to_base64(&self.signing_key, message)
    }
}

impl Drop for OrgKeyPair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Fingerprint of any verifying key, as produced by [`OrgKeyPair::fingerprint`].
pub fn fingerprint_of(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.to_bytes());
    format!("org_{}", bs58::encode(&digest[..20]).into_string())
}

/// Decode a base64 public key.
pub fn verifying_key_from_base64(encoded: &str) -> Result<VerifyingKey> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
        .map_err(|e| CredentialError::InvalidKey(format!("invalid base64 public key: {e}")))?;
    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CredentialError::InvalidKey("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CredentialError::InvalidKey(format!("invalid verifying key: {e}")))
}
