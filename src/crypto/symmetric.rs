//! AES-256-GCM authenticated encryption.
//!
//! Adapted from this repo's `enterprise::crypto::symmetric::Aes256GcmCipher`,
//! trimmed to the single algorithm used for the on-chain wire
//! format (ChaCha20/XChaCha20 variants are not part of that format and are
//! dropped here).

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Errors from AES-256-GCM encrypt/decrypt operations.
#[derive(Error, Debug)]
pub enum SymmetricError {
    /// The supplied key was not exactly 32 bytes.
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    /// The supplied nonce/IV was not exactly 12 bytes.
    #[error("invalid nonce size: expected {expected}, got {actual}")]
    InvalidNonceSize { expected: usize, actual: usize },

    /// Encryption failed (should only happen on malformed input).
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed: wrong key, wrong AAD, or corrupted/tampered data.
    #[error("decryption failed: authentication error or corrupted data")]
    DecryptionFailed,
}

/// Result alias for symmetric crypto operations.
pub type SymmetricResult<T> = Result<T, SymmetricError>;

/// An AES-256-GCM cipher bound to a single 256-bit key.
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    /// Key size in bytes (256 bits).
    pub const KEY_SIZE: usize = 32;
    /// Nonce size in bytes (96 bits, matching the wire format's `iv` field).
    pub const NONCE_SIZE: usize = 12;

    /// Build a cipher from a 32-byte key (typically PBKDF2 output).
    pub fn new(key: &[u8]) -> SymmetricResult<Self> {
        if key.len() != Self::KEY_SIZE {
            return Err(SymmetricError::InvalidKeySize {
                expected: Self::KEY_SIZE,
                actual: key.len(),
            });
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SymmetricError::EncryptionFailed)?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random 96-bit nonce. Callers MUST use a unique
    /// nonce per encryption under the same key.
    pub fn generate_nonce() -> [u8; 12] {
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Encrypt `plaintext` under `nonce`, returning the authenticated
    /// ciphertext (tag appended, as the RustCrypto AEAD trait does).
    pub fn encrypt(&self, nonce: &[u8], plaintext: &[u8]) -> SymmetricResult<Vec<u8>> {
        if nonce.len() != Self::NONCE_SIZE {
            return Err(SymmetricError::InvalidNonceSize {
                expected: Self::NONCE_SIZE,
                actual: nonce.len(),
            });
        }
        let nonce = Nonce::from_slice(nonce);
        self.cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: b"" })
            .map_err(|_| SymmetricError::EncryptionFailed)
    }

    /// Decrypt `ciphertext` (tag-appended) under `nonce`.
    pub fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> SymmetricResult<Vec<u8>> {
        if nonce.len() != Self::NONCE_SIZE {
            return Err(SymmetricError::InvalidNonceSize {
                expected: Self::NONCE_SIZE,
                actual: nonce.len(),
            });
        }
        let nonce = Nonce::from_slice(nonce);
        self.cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad: b"" })
            .map_err(|_| SymmetricError::DecryptionFailed)
    }
}
