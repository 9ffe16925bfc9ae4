//! Metadata layer types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coarse size bucket for a block's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeRange {
    /// < 1 KiB.
    Tiny,
    /// 1 KiB – 16 KiB.
    Small,
    /// 16 KiB – 256 KiB.
    Medium,
    /// > 256 KiB.
    Large,
}

impl SizeRange {
    /// Bucket a byte length into a `SizeRange`.
    pub fn from_len(len: usize) -> Self {
        match len {
            0..=1023 => SizeRange::Tiny,
            1024..=16_383 => SizeRange::Small,
            16_384..=262_143 => SizeRange::Medium,
            _ => SizeRange::Large,
        }
    }
}

/// The always-searchable public metadata tier.
///
/// Invariant: all tokens in `general_keywords` are nonempty, lowercased,
/// trimmed, and unique (enforced by [`crate::util::tokenize`] and the
/// builder in `MetadataLayerManager`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicMetadata {
    /// Lowercased, deduplicated keyword tokens.
    pub general_keywords: BTreeSet<String>,
    /// Block-level category string.
    pub block_category: String,
    /// MIME content type of the block payload.
    pub content_type: String,
    /// Coarse payload size bucket.
    pub size_range: SizeRange,
    /// ISO date (`YYYY-MM-DD`) the block falls on.
    pub time_range: String,
    /// The block's own content-addressed hash.
    pub hash_fingerprint: String,
}

impl PublicMetadata {
    /// Richness bonus used to break ties between equally-matching blocks
    ///: `1.0 + 0.1 * |general_keywords| + (2.0 if a private
    /// layer exists else 0.0)`.
    pub fn richness(&self, has_private_layer: bool) -> f64 {
        1.0 + 0.1 * self.general_keywords.len() as f64
            + if has_private_layer { 2.0 } else { 0.0 }
    }
}

/// The password-gated private metadata tier, in its plaintext form
///. Serialized to JSON, optionally compressed, then encrypted
/// into the opaque `encrypted_private_layer` string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateMetadata {
    /// Fine-grained keyword tokens.
    pub detailed_keywords: BTreeSet<String>,
    /// Terms that, if matched, mark a result as sensitive.
    pub sensitive_terms: BTreeSet<String>,
    /// Structured identifiers.
    pub identifiers: BTreeSet<String>,
    /// Free-text content summary.
    pub content_summary: String,
    /// Fine-grained content category.
    pub content_category: String,
}

impl PrivateMetadata {
    /// Whether every field is empty (used by `MetadataLayerManager` to
    /// decide whether a private layer is worth building at all).
    pub fn is_empty(&self) -> bool {
        self.detailed_keywords.is_empty()
            && self.sensitive_terms.is_empty()
            && self.identifiers.is_empty()
            && self.content_summary.is_empty()
            && self.content_category.is_empty()
    }
}

/// The two metadata tiers produced for a single block.
///
/// Invariant: at least one layer is non-empty, or the block is skipped
/// for indexing entirely (enforced by `MetadataLayerManager::build`'s
/// caller).
#[derive(Debug, Clone, Default)]
pub struct BlockMetadataLayers {
    /// Always-searchable public layer.
    pub public_layer: PublicMetadata,
    /// Opaque ciphertext of the private layer, if one was built.
    pub encrypted_private_layer: Option<String>,
}

impl BlockMetadataLayers {
    /// Whether both layers are effectively empty and the block should be
    /// skipped for indexing.
    pub fn is_skippable(&self) -> bool {
        self.public_layer.general_keywords.is_empty()
            && self.public_layer.hash_fingerprint.is_empty()
            && self.encrypted_private_layer.is_none()
    }
}

impl Default for SizeRange {
    fn default() -> Self {
        SizeRange::Tiny
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_range_buckets() {
        assert_eq!(SizeRange::from_len(10), SizeRange::Tiny);
        assert_eq!(SizeRange::from_len(2000), SizeRange::Small);
        assert_eq!(SizeRange::from_len(20_000), SizeRange::Medium);
        assert_eq!(SizeRange::from_len(1_000_000), SizeRange::Large);
    }

    #[test]
    fn richness_matches_expected_formula() {
        let mut meta = PublicMetadata::default();
        meta.general_keywords.insert("a".to_string());
        meta.general_keywords.insert("b".to_string());
        assert!((meta.richness(false) - 1.2).abs() < 1e-9);
        assert!((meta.richness(true) - 3.2).abs() < 1e-9);
    }
}
