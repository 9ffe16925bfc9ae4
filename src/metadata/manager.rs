//! `MetadataLayerManager` — builds [`BlockMetadataLayers`] from a block.

use crate::config::EngineConfig;
use crate::crypto::{derive_pbkdf2_sha512, Aes256GcmCipher, Pbkdf2Params};
use crate::ledger::Block;
use crate::metadata::types::{BlockMetadataLayers, PrivateMetadata, PublicMetadata, SizeRange};
use crate::wire::PrivateMetadataWire;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// Categories dropped from public keywords: `user_defined`
/// and `general` carry no discriminating information.
const DROPPED_CATEGORIES: &[&str] = &["user_defined", "general"];

/// Minimum token length kept during tokenization.
const MIN_TOKEN_LEN: usize = 2;

/// Cap on the derived private-layer `content_summary` length, in chars.
const CONTENT_SUMMARY_MAX_CHARS: usize = 280;

/// Transforms a block (plus optional password / user-supplied terms)
/// into its public + private metadata layers.
pub struct MetadataLayerManager;

impl MetadataLayerManager {
    /// Build the metadata layers for `block`. Never panics or returns an
    /// `Err` — on any non-fatal failure this degrades to a minimal
    /// layers object.
    pub fn build(
        block: &Block,
        _config: &EngineConfig,
        password: Option<&str>,
        user_public_terms: Option<&[String]>,
        user_private_terms: Option<&[String]>,
    ) -> BlockMetadataLayers {
        match Self::try_build(block, password, user_public_terms, user_private_terms) {
            Ok(layers) => layers,
            Err(reason) => {
                tracing::warn!(block_hash = %block.hash, %reason, "metadata build failed, degrading to minimal layers");
                Self::minimal_layers(block)
            }
        }
    }

    fn try_build(
        block: &Block,
        password: Option<&str>,
        user_public_terms: Option<&[String]>,
        user_private_terms: Option<&[String]>,
    ) -> Result<BlockMetadataLayers, String> {
        let public_layer = Self::build_public_layer(block, user_public_terms)?;

        let decrypted_plaintext = if block.is_encrypted {
            password.and_then(|pw| Self::decrypt_payload(block, pw))
        } else {
            None
        };

        let should_build_private = block.is_encrypted
            && password.is_some()
            && (user_private_terms.map(|t| !t.is_empty()).unwrap_or(false) || decrypted_plaintext.is_some());

        let encrypted_private_layer = if should_build_private {
            let private = Self::build_private_metadata(block, user_private_terms, decrypted_plaintext.as_deref());
            if private.is_empty() {
                None
            } else {
                Some(Self::encrypt_private_layer(&private, password.unwrap())?)
            }
        } else {
            None
        };

        Ok(BlockMetadataLayers {
            public_layer,
            encrypted_private_layer,
        })
    }

    fn build_public_layer(
        block: &Block,
        user_public_terms: Option<&[String]>,
    ) -> Result<PublicMetadata, String> {
        let general_keywords: BTreeSet<String> = if let Some(terms) = user_public_terms {
            Self::normalize_tokens(terms.iter().map(String::as_str))
        } else {
            Self::heuristic_tokens(block)
        };

        Ok(PublicMetadata {
            general_keywords,
            block_category: block.content_category.clone(),
            content_type: Self::guess_content_type(block),
            size_range: SizeRange::from_len(block.payload_bytes.len()),
            time_range: block.timestamp.format("%Y-%m-%d").to_string(),
            hash_fingerprint: block.hash.clone(),
        })
    }

    /// Heuristic public tokens: plaintext payload (when not encrypted),
    /// category, size bucket, and ISO date.
    fn heuristic_tokens(block: &Block) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();

        if !block.is_encrypted {
            if let Ok(text) = std::str::from_utf8(&block.payload_bytes) {
                tokens.extend(Self::normalize_tokens(text.split_whitespace()));
            }
        }

        if !DROPPED_CATEGORIES.contains(&block.content_category.as_str()) {
            tokens.extend(Self::normalize_tokens(std::iter::once(block.content_category.as_str())));
        }

        let size_bucket = match SizeRange::from_len(block.payload_bytes.len()) {
            SizeRange::Tiny => "tiny",
            SizeRange::Small => "small",
            SizeRange::Medium => "medium",
            SizeRange::Large => "large",
        };
        tokens.insert(size_bucket.to_string());
        tokens.insert(block.timestamp.format("%Y-%m-%d").to_string());

        tokens
    }

    fn normalize_tokens<'a>(raw: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
        raw.map(|t| t.trim().to_lowercase())
            .filter(|t| t.len() >= MIN_TOKEN_LEN && !DROPPED_CATEGORIES.contains(&t.as_str()))
            .collect()
    }

    fn guess_content_type(block: &Block) -> String {
        block
            .off_chain_ref
            .as_ref()
            .map(|r| r.content_type.clone())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    fn decrypt_payload(block: &Block, password: &str) -> Option<String> {
        let metadata = block.encryption_metadata.as_deref()?;
        let parsed = crate::wire::EncryptionMetadata::parse(metadata)?;
        let salt = B64.decode(parsed.salt_b64).ok()?;
        let iv = B64.decode(parsed.iv_b64).ok()?;
        let ciphertext = B64.decode(parsed.ciphertext_b64).ok()?;
        let key = derive_pbkdf2_sha512(password.as_bytes(), &salt, Pbkdf2Params::default());
        let cipher = Aes256GcmCipher::new(&key).ok()?;
        let plaintext = cipher.decrypt(&iv, &ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Build the private layer's content. User-supplied terms take
    /// precedence; otherwise, when the payload was decrypted for
    /// scannability, derive keywords and a summary from it the same way
    /// `heuristic_tokens` derives public keywords from a plaintext
    /// payload.
    fn build_private_metadata(block: &Block, user_private_terms: Option<&[String]>, decrypted_plaintext: Option<&str>) -> PrivateMetadata {
        let mut private = PrivateMetadata::default();

        if let Some(terms) = user_private_terms {
            private.detailed_keywords = Self::normalize_tokens(terms.iter().map(String::as_str));
        } else if let Some(text) = decrypted_plaintext {
            private.detailed_keywords = Self::normalize_tokens(text.split_whitespace());
            private.content_summary = Self::summarize(text);
        }

        private.content_category = block.content_category.clone();
        private
    }

    /// Truncate decrypted plaintext to a short free-text summary.
    fn summarize(text: &str) -> String {
        text.chars().take(CONTENT_SUMMARY_MAX_CHARS).collect()
    }

    /// Serialize to JSON, compress if it shrinks the blob by >= 10%, and
    /// encrypt with a password-derived AES-256-GCM key.
    ///
    /// Wire format of the returned opaque string:
    /// `base64(salt).base64(nonce).<c|r>base64(payload)` where the
    /// single-character compression flag (`c` = deflate-compressed,
    /// `r` = raw) is the first byte of the encrypted payload itself, so
    /// only two base64 segments (salt, nonce) plus one payload segment
    /// are exposed on the wire.
    pub(crate) fn encrypt_private_layer(private: &PrivateMetadata, password: &str) -> Result<String, String> {
        let wire = PrivateMetadataWire {
            detailed_keywords: private.detailed_keywords.iter().cloned().collect(),
            sensitive_terms: private.sensitive_terms.iter().cloned().collect(),
            identifiers: private.identifiers.iter().cloned().collect(),
            content_summary: private.content_summary.clone(),
            detailed_category: private.content_category.clone(),
        };
        let raw_json = serde_json::to_vec(&wire).map_err(|e| e.to_string())?;
        let compressed = Self::compress(&raw_json);

        let (flag, payload): (u8, &[u8]) = if compressed.len() as f64 <= raw_json.len() as f64 * 0.90 {
            (b'c', &compressed)
        } else {
            (b'r', &raw_json)
        };
        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.push(flag);
        framed.extend_from_slice(payload);

        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let key = derive_pbkdf2_sha512(password.as_bytes(), &salt, Pbkdf2Params::default());
        let cipher = Aes256GcmCipher::new(&key).map_err(|e| e.to_string())?;
        let nonce = Aes256GcmCipher::generate_nonce();
        let ciphertext = cipher.encrypt(&nonce, &framed).map_err(|e| e.to_string())?;

        Ok(format!("{}.{}.{}", B64.encode(salt), B64.encode(nonce), B64.encode(ciphertext)))
    }

    /// Decrypt an opaque private-layer blob produced by
    /// `encrypt_private_layer`. Never throws — any failure (wrong
    /// password, malformed data) yields `None`.
    pub fn decrypt_private(ciphertext: &str, password: &str) -> Option<PrivateMetadata> {
        let mut parts = ciphertext.splitn(3, '.');
        let salt = B64.decode(parts.next()?).ok()?;
        let nonce = B64.decode(parts.next()?).ok()?;
        let payload = B64.decode(parts.next()?).ok()?;

        let key = derive_pbkdf2_sha512(password.as_bytes(), &salt, Pbkdf2Params::default());
        let cipher = Aes256GcmCipher::new(&key).ok()?;
        let framed = cipher.decrypt(&nonce, &payload).ok()?;

        let (flag, body) = framed.split_first()?;
        let raw_json = match *flag {
            b'c' => Self::decompress(body)?,
            b'r' => body.to_vec(),
            _ => return None,
        };

        let wire: PrivateMetadataWire = serde_json::from_slice(&raw_json).ok()?;
        Some(PrivateMetadata {
            detailed_keywords: wire.detailed_keywords.into_iter().collect(),
            sensitive_terms: wire.sensitive_terms.into_iter().collect(),
            identifiers: wire.identifiers.into_iter().collect(),
            content_summary: wire.content_summary,
            content_category: wire.detailed_category,
        })
    }

    fn compress(raw: &[u8]) -> Vec<u8> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let _ = encoder.write_all(raw);
        encoder.finish().unwrap_or_else(|_| raw.to_vec())
    }

    fn decompress(compressed: &[u8]) -> Option<Vec<u8>> {
        use flate2::read::DeflateDecoder;
        let mut decoder = DeflateDecoder::new(compressed);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).ok()?;
        Some(out)
    }

    /// Minimal fallback layers: `{block,indexed}` keywords plus hash and
    /// time range, used whenever `build` hits a non-fatal failure
    /// so the block stays retrievable by hash.
    fn minimal_layers(block: &Block) -> BlockMetadataLayers {
        let mut general_keywords = BTreeSet::new();
        general_keywords.insert("block".to_string());
        general_keywords.insert("indexed".to_string());

        BlockMetadataLayers {
            public_layer: PublicMetadata {
                general_keywords,
                block_category: String::new(),
                content_type: "text/plain".to_string(),
                size_range: SizeRange::from_len(block.payload_bytes.len()),
                time_range: block.timestamp.format("%Y-%m-%d").to_string(),
                hash_fingerprint: block.hash.clone(),
            },
            encrypted_private_layer: None,
        }
    }
}
