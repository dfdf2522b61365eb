//! Cryptographic primitives for the credential pipeline.
//!
//! This module provides:
//! - Ed25519 organization key generation, signing, and verification
//! - SHA-256 field digests used for certificate seals and ledger entries
//! - Argon2id + HKDF-SHA256 passphrase key derivation
//! - ChaCha20-Poly1305 authenticated encryption for keys at rest
//! - Opaque random tokens for verification ids

pub mod encryption;
pub mod keys;
pub mod random;
pub mod signing;

pub use keys::OrgKeyPair;
