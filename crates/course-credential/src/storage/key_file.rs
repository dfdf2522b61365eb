//! Encrypted storage for the organization signing key.
//!
//! File format (JSON):
//! ```json
//! {
//!     "version": 1,
//!     "format": "ccred-key-v1",
//!     "encryption": {
//!         "algorithm": "chacha20-poly1305",
//!         "kdf": "argon2id",
//!         "salt": "<base64-16-bytes>",
//!         "nonce": "<base64-12-bytes>"
//!     },
//!     "encrypted_key": "<base64-ciphertext>",
//!     "public_key": "<base64-32-bytes>",
//!     "fingerprint": "org_...",
//!     "created_at": 1700000000000000
//! }
//! ```
//!
//! The public half is stored in plaintext so certificates can be checked
//! against the trusted key without the passphrase.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::encryption::{open_with_passphrase, seal_with_passphrase, SealedBox};
use crate::crypto::OrgKeyPair;
use crate::error::{CredentialError, Result};

use super::write_atomic;

const KEY_FILE_VERSION: u32 = 1;
const KEY_FILE_FORMAT: &str = "ccred-key-v1";
const KEY_ALGORITHM: &str = "chacha20-poly1305";
const KEY_KDF: &str = "argon2id";

/// HKDF context for the key-file encryption key. Must stay stable.
const ORG_KEY_CONTEXT: &str = "org-signing-key";

/// Top-level structure written to disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrgKeyFile {
    pub version: u32,
    pub format: String,
    pub encryption: EncryptionMetadata,
    /// Base64 ciphertext of the 32 signing key bytes.
    pub encrypted_key: String,
    pub public_key: String,
    pub fingerprint: String,
    pub created_at: u64,
}

/// Encryption parameters stored alongside the ciphertext.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub algorithm: String,
    pub kdf: String,
    pub salt: String,
    pub nonce: String,
}

/// Public information readable without the passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    pub public_key: String,
    pub fingerprint: String,
    pub created_at: u64,
}

/// Encrypt and write the organization key to `path`.
pub fn save_org_key(key: &OrgKeyPair, path: &Path, passphrase: &str, created_at: u64) -> Result<()> {
    let mut secret = key.signing_key_bytes();
    let sealed = seal_with_passphrase(passphrase.as_bytes(), ORG_KEY_CONTEXT, &secret);
    secret.zeroize();
    let sealed = sealed?;

    let file = OrgKeyFile {
        version: KEY_FILE_VERSION,
        format: KEY_FILE_FORMAT.to_string(),
        encryption: EncryptionMetadata {
            algorithm: KEY_ALGORITHM.to_string(),
            kdf: KEY_KDF.to_string(),
            salt: STANDARD.encode(sealed.salt),
            nonce: STANDARD.encode(sealed.nonce),
        },
        encrypted_key: STANDARD.encode(&sealed.ciphertext),
        public_key: key.public_key_base64(),
        fingerprint: key.fingerprint(),
        created_at,
    };

    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| CredentialError::SerializationError(e.to_string()))?;
    write_atomic(path, json.as_bytes())
}

/// Load and decrypt the organization key.
///
/// A wrong passphrase fails AEAD authentication and surfaces as
/// `CredentialError::InvalidPassphrase`.
pub fn load_org_key(path: &Path, passphrase: &str) -> Result<OrgKeyPair> {
    let file = read_key_file(path)?;

    let salt: [u8; 16] = decode_field(&file.encryption.salt, "salt")?
        .try_into()
        .map_err(|_| CredentialError::InvalidFileFormat("salt must be 16 bytes".into()))?;
    let nonce: [u8; 12] = decode_field(&file.encryption.nonce, "nonce")?
        .try_into()
        .map_err(|_| CredentialError::InvalidFileFormat("nonce must be 12 bytes".into()))?;
    let ciphertext = decode_field(&file.encrypted_key, "ciphertext")?;

    let sealed = SealedBox {
        salt,
        nonce,
        ciphertext,
    };
    let mut plaintext = open_with_passphrase(passphrase.as_bytes(), ORG_KEY_CONTEXT, &sealed)?;
    let key_bytes: std::result::Result<[u8; 32], _> = plaintext.as_slice().try_into();
    plaintext.zeroize();
    let mut key_bytes =
        key_bytes.map_err(|_| CredentialError::InvalidKey("signing key must be 32 bytes".into()))?;

    let key = OrgKeyPair::from_signing_key_bytes(&key_bytes);
    key_bytes.zeroize();

    if key.public_key_base64() != file.public_key {
        return Err(CredentialError::InvalidFileFormat(
            "decrypted key does not match stored public key".into(),
        ));
    }
    Ok(key)
}

/// Read the public half of a key file without decrypting.
pub fn read_public_key(path: &Path) -> Result<PublicKeyInfo> {
    let file = read_key_file(path)?;
    Ok(PublicKeyInfo {
        public_key: file.public_key,
        fingerprint: file.fingerprint,
        created_at: file.created_at,
    })
}

fn read_key_file(path: &Path) -> Result<OrgKeyFile> {
    let bytes = std::fs::read(path)?;
    let file: OrgKeyFile = serde_json::from_slice(&bytes)
        .map_err(|e| CredentialError::InvalidFileFormat(format!("failed to parse key file: {e}")))?;
    if file.version != KEY_FILE_VERSION || file.format != KEY_FILE_FORMAT {
        return Err(CredentialError::InvalidFileFormat(format!(
            "unsupported key file version={} format={}",
            file.version, file.format
        )));
    }
    Ok(file)
}

fn decode_field(value: &str, what: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CredentialError::InvalidFileFormat(format!("invalid {what} base64: {e}")))
}
