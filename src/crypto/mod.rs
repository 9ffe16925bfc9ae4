//! Cryptographic primitives used by [`crate::metadata::manager`] and the
//! on-chain wire format in [`crate::wire`].
//!
//! AES-256-GCM for authenticated encryption, PBKDF2-HMAC-SHA-512 for
//! password-based key derivation used for on-chain payload encryption.

pub mod kdf;
pub mod symmetric;

pub use kdf::{derive_pbkdf2_sha512, Pbkdf2Params};
pub use symmetric::{Aes256GcmCipher, SymmetricError, SymmetricResult};
