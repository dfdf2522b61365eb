//! Passphrase encryption for keys at rest.
//!
//! passphrase → Argon2id(passphrase, salt) → master key
//! → HKDF-SHA256(master key, context) → ChaCha20-Poly1305 key.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::random::{random_nonce_12, random_salt_16};
use crate::error::{CredentialError, Result};

/// Argon2id parameters for passphrase-based key derivation.
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

/// Ciphertext plus the parameters needed to open it.
#[derive(Debug, Clone)]
pub struct SealedBox {
    pub salt: [u8; 16],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Derive a 32-byte key from a passphrase and salt using Argon2id.
pub fn derive_passphrase_key(passphrase: &[u8], salt: &[u8; 16]) -> Result<[u8; 32]> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| CredentialError::DerivationFailed(format!("Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| CredentialError::DerivationFailed(format!("Argon2 hash: {e}")))?;

    Ok(output)
}

/// Expand `master` into a context-scoped 32-byte key with HKDF-SHA256.
pub fn derive_context_key(master: &[u8; 32], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, master);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| CredentialError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Encrypt `plaintext` under a key derived from `passphrase` and `context`.
pub fn seal_with_passphrase(passphrase: &[u8], context: &str, plaintext: &[u8]) -> Result<SealedBox> {
    let salt = random_salt_16();
    let nonce = random_nonce_12();
    let mut key = passphrase_context_key(passphrase, context, &salt)?;

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CredentialError::EncryptionFailed(format!("cipher init: {e}")));
    key.zeroize();
    let ciphertext = cipher?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CredentialError::EncryptionFailed(format!("encrypt: {e}")))?;

    Ok(SealedBox {
        salt,
        nonce,
        ciphertext,
    })
}

/// Decrypt a [`SealedBox`]. A wrong passphrase surfaces as `InvalidPassphrase`.
pub fn open_with_passphrase(passphrase: &[u8], context: &str, sealed: &SealedBox) -> Result<Vec<u8>> {
    let mut key = passphrase_context_key(passphrase, context, &sealed.salt)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| CredentialError::DecryptionFailed(format!("cipher init: {e}")));
    key.zeroize();
    cipher?
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map_err(|_| CredentialError::InvalidPassphrase)
}

fn passphrase_context_key(passphrase: &[u8], context: &str, salt: &[u8; 16]) -> Result<[u8; 32]> {
    let mut master = derive_passphrase_key(passphrase, salt)?;
    let key = derive_context_key(&master, context);
    master.zeroize();
    key
}
