//! On-chain content search: scan plaintext payloads directly, and
//! opportunistically decrypt encrypted payloads when a password is
//! available.

use crate::crypto::{derive_pbkdf2_sha512, Aes256GcmCipher, Pbkdf2Params};
use crate::ledger::{Block, BlockId};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use regex::escape;

const MAX_SNIPPETS_PER_BLOCK: usize = 5;
const SNIPPET_CONTEXT_CHARS: usize = 100;

/// A single on-chain content hit.
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainSearchResult {
    /// The matching block's id.
    pub block_id: BlockId,
    /// Match score: fraction of query tokens found, ∈ (0, 1].
    pub score: f64,
    /// Up to [`MAX_SNIPPETS_PER_BLOCK`] highlighted context snippets.
    pub snippets: Vec<String>,
}

/// Scans block payload bytes directly, decrypting opportunistically.
#[derive(Default)]
pub struct OnChainContentSearch;

impl OnChainContentSearch {
    /// Build a new on-chain content searcher.
    pub fn new() -> Self {
        Self
    }

    /// Scan `blocks` for `query`, decrypting encrypted payloads with
    /// `password` when given. Blocks whose payload can't be read or
    /// decrypted are skipped silently.
    pub fn search(&self, blocks: &[Block], query: &str, password: Option<&str>, max_results: usize) -> Vec<OnChainSearchResult> {
        let tokens: Vec<String> = crate::util::tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for block in blocks {
            let Some(plaintext) = Self::resolve_plaintext(block, password) else {
                continue;
            };

            let lower = plaintext.to_lowercase();
            let matched = tokens.iter().filter(|t| lower.contains(t.as_str())).count();
            if matched == 0 {
                continue;
            }

            let snippets = Self::extract_snippets(&plaintext, &tokens);
            results.push(OnChainSearchResult {
                block_id: block.hash.clone(),
                score: matched as f64 / tokens.len() as f64,
                snippets,
            });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(max_results);
        results
    }

    fn resolve_plaintext(block: &Block, password: Option<&str>) -> Option<String> {
        if !block.is_encrypted {
            return String::from_utf8(block.payload_bytes.clone()).ok();
        }

        let password = password?;
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

    /// Extract up to [`MAX_SNIPPETS_PER_BLOCK`] `±100`-char snippets
    /// around case-insensitive matches of any query token.
    fn extract_snippets(text: &str, tokens: &[String]) -> Vec<String> {
        let mut snippets = Vec::new();

        for token in tokens {
            if snippets.len() >= MAX_SNIPPETS_PER_BLOCK {
                break;
            }
            let Ok(re) = regex::RegexBuilder::new(&escape(token)).case_insensitive(true).build() else {
                continue;
            };

            for m in re.find_iter(text) {
                if snippets.len() >= MAX_SNIPPETS_PER_BLOCK {
                    break;
                }
                let start = m.start().saturating_sub(SNIPPET_CONTEXT_CHARS);
                let end = (m.end() + SNIPPET_CONTEXT_CHARS).min(text.len());
                let start = Self::floor_char_boundary(text, start);
                let end = Self::ceil_char_boundary(text, end);
                let snippet = format!("{}**{}**{}", &text[start..m.start()], &text[m.start()..m.end()], &text[m.end()..end]);
                snippets.push(snippet);
            }
        }

        snippets
    }

    fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
        while idx > 0 && !text.is_char_boundary(idx) {
            idx -= 1;
        }
        idx
    }

    fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
        while idx < text.len() && !text.is_char_boundary(idx) {
            idx += 1;
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plaintext_block(hash: &str, payload: &str) -> Block {
        Block {
            block_number: 1,
            hash: hash.to_string(),
            timestamp: Utc::now(),
            is_encrypted: false,
            payload_bytes: payload.as_bytes().to_vec(),
            encryption_metadata: None,
            manual_keywords: None,
            content_category: "general".to_string(),
            off_chain_ref: None,
        }
    }

    #[test]
    fn scans_plaintext_payload_without_password() {
        let search = OnChainContentSearch::new();
        let block = plaintext_block("b1", "the quick brown fox jumps");
        let results = search.search(&[block], "quick fox", None, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].block_id, "b1");
    }

    #[test]
    fn skips_encrypted_block_without_password() {
        let search = OnChainContentSearch::new();
        let mut block = plaintext_block("b1", "");
        block.is_encrypted = true;
        block.encryption_metadata = Some("not-parseable".to_string());
        let results = search.search(&[block], "anything", None, 10);
        assert!(results.is_empty());
    }

    #[test]
    fn caps_snippets_at_five_per_block() {
        let search = OnChainContentSearch::new();
        let payload = "alpha ".repeat(20);
        let block = plaintext_block("b1", &payload);
        let results = search.search(&[block], "alpha", None, 10);
        assert_eq!(results.len(), 1);
        assert!(results[0].snippets.len() <= 5);
    }

    #[test]
    fn no_query_tokens_yields_empty_results() {
        let search = OnChainContentSearch::new();
        let block = plaintext_block("b1", "text");
        let results = search.search(&[block], "  ", None, 10);
        assert!(results.is_empty());
    }
}
