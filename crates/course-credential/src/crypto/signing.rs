//! Ed25519 signing and field digests.
//!
//! Seals and ledger entries are built the same way: the content fields are
//! hashed with SHA-256, each prefixed by its byte length, and the hex digest
//! is signed.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{CredentialError, Result};

/// Sign a message and return the signature as a base64-encoded string.
pub fn sign_to_base64(signing_key: &SigningKey, message: &[u8]) -> String {
    let sig = signing_key.sign(message);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, sig.to_bytes())
}

/// Verify a base64-encoded signature.
pub fn verify_from_base64(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<()> {
    let sig_bytes =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, signature_b64)
            .map_err(|e| CredentialError::InvalidKey(format!("invalid base64 signature: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CredentialError::InvalidKey("signature must be 64 bytes".into()))?;

    let signature = Signature::from_bytes(&sig_array);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CredentialError::SignatureInvalid)
}

/// Hex SHA-256 digest of `fields`.
///
/// Every field is preceded by its length as a big-endian `u64`, so no choice
/// of field contents can shift bytes from one field into the next.
pub fn digest_fields(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Derive a prefixed identifier (`{prefix}_{base58}`) from a hex digest.
pub fn id_from_digest(prefix: &str, digest_hex: &str) -> String {
    let id_hash = Sha256::digest(digest_hex.as_bytes());
    format!("{prefix}_{}", bs58::encode(&id_hash[..16]).into_string())
}
