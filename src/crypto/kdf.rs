//! Password-based key derivation.
//!
//! Adapted from `enterprise::crypto::kdf::KdfProvider::derive_pbkdf2_sha512`,
//! narrowed to the single KDF the wire format mandates:
//! PBKDF2-HMAC-SHA-512, 210,000 iterations, 256-bit derived key.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;

/// PBKDF2 parameters.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Params {
    /// Iteration count.
    pub iterations: u32,
    /// Derived key length, in bytes.
    pub key_length: usize,
}

impl Default for Pbkdf2Params {
    fn default() -> Self {
        Self {
            iterations: 210_000,
            key_length: 32,
        }
    }
}

/// Derive a key from `password` and `salt` using PBKDF2-HMAC-SHA-512.
pub fn derive_pbkdf2_sha512(password: &[u8], salt: &[u8], params: Pbkdf2Params) -> Vec<u8> {
    let mut key = vec![0u8; params.key_length];
    pbkdf2_hmac::<Sha512>(password, salt, params.iterations, &mut key);
    key
}
