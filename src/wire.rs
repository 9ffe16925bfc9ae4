//! On-chain wire formats.

use serde::{Deserialize, Deserializer, Serialize};

/// The five fields of an `encryption_metadata` string
/// (`<timestamp>|<salt>|<iv>|<ciphertext>|<integrity_tag>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionMetadata {
    /// Epoch-millis timestamp the block was encrypted at.
    pub timestamp_millis: i64,
    /// Base64-encoded PBKDF2 salt.
    pub salt_b64: String,
    /// Base64-encoded 96-bit AES-GCM IV.
    pub iv_b64: String,
    /// Base64-encoded authenticated ciphertext.
    pub ciphertext_b64: String,
    /// Base64-encoded authentication tag (may be empty if embedded in
    /// `ciphertext_b64`).
    pub integrity_tag_b64: String,
}

impl EncryptionMetadata {
    /// Parse the pipe-delimited wire string. Returns `None` if it does
    /// not split into exactly five fields or the timestamp isn't a valid
    /// signed 64-bit integer; such blocks are treated as unreadable
    /// encrypted blocks and skipped silently by decryption paths.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.split('|').collect();
        if fields.len() != 5 {
            return None;
        }
        let timestamp_millis = fields[0].parse::<i64>().ok()?;
        Some(Self {
            timestamp_millis,
            salt_b64: fields[1].to_string(),
            iv_b64: fields[2].to_string(),
            ciphertext_b64: fields[3].to_string(),
            integrity_tag_b64: fields[4].to_string(),
        })
    }

    /// Serialize back to the pipe-delimited wire format.
    pub fn to_wire_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.timestamp_millis, self.salt_b64, self.iv_b64, self.ciphertext_b64, self.integrity_tag_b64
        )
    }
}

/// Decoded private-metadata JSON shape, after decrypt +
/// optional decompress. Field names accept either `specificKeywords` or
/// `detailedKeywords` on read; canonical output always uses
/// `detailedKeywords`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateMetadataWire {
    /// Canonical field name for detailed keywords.
    #[serde(
        default,
        rename = "detailedKeywords",
        alias = "specificKeywords",
        deserialize_with = "string_array_lenient"
    )]
    pub detailed_keywords: Vec<String>,
    /// Sensitive terms requiring the highest access tier.
    #[serde(default, rename = "sensitiveTerms", deserialize_with = "string_array_lenient")]
    pub sensitive_terms: Vec<String>,
    /// Structured identifiers (e.g. patient/record ids).
    #[serde(default, rename = "identifiers", deserialize_with = "string_array_lenient")]
    pub identifiers: Vec<String>,
    /// Free-text content summary.
    #[serde(default, rename = "contentSummary")]
    pub content_summary: String,
    /// Fine-grained content category.
    #[serde(default, rename = "detailedCategory")]
    pub detailed_category: String,
}

/// Deserialize a JSON array into `Vec<String>`, dropping any element
/// that isn't a string rather than failing the whole parse.
fn string_array_lenient<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect())
}
