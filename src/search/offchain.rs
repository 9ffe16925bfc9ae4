//! Off-chain file search: decrypt and scan files referenced by blocks.

use crate::ledger::{Block, OffChainHandle};
use crate::util::TtlCache;
use serde_json::Value;
use std::time::Duration;

/// A single off-chain file hit.
#[derive(Debug, Clone, PartialEq)]
pub struct OffChainMatch {
    /// The originating block's number.
    pub block_number: u64,
    /// The originating block's hash.
    pub block_hash: String,
    /// Path of the matched file within the storage service.
    pub file_path: String,
    /// MIME content type of the file.
    pub content_type: String,
    /// Number of lines/keys/values that matched.
    pub match_count: usize,
    /// Human-readable context snippets.
    pub snippets: Vec<String>,
    /// Size, in bytes, of the decrypted file.
    pub file_size: u64,
}

/// Result of an off-chain search pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffChainSearchResult {
    /// Per-file matches, sorted by (match_count desc, block_number asc).
    pub matches: Vec<OffChainMatch>,
    /// Number of off-chain files that were actually opened and scanned.
    pub files_searched: usize,
}

const JSON_WALK_MAX_DEPTH: usize = 50;

/// Decrypts and text/JSON/binary-scans off-chain files.
pub struct OffChainFileSearch {
    result_cache: TtlCache<String, OffChainSearchResult>,
}

impl OffChainFileSearch {
    /// Build a new off-chain search with the given cache TTL.
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            result_cache: TtlCache::new(cache_ttl),
        }
    }

    fn cache_key(query: &str, password: &str, blocks: &[Block]) -> String {
        let password_hash = blake3::hash(password.as_bytes()).to_hex().to_string();
        let mut hasher = blake3::Hasher::new();
        hasher.update(query.as_bytes());
        hasher.update(password_hash.as_bytes());
        for block in blocks {
            hasher.update(block.hash.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Search every off-chain file referenced by `blocks` for `query`.
    pub fn search(
        &self,
        blocks: &[Block],
        query: &str,
        password: &str,
        max_results: usize,
        storage: &OffChainHandle,
    ) -> OffChainSearchResult {
        let key = Self::cache_key(query, password, blocks);
        if let Some(cached) = self.result_cache.get(&key) {
            return cached;
        }

        let query_lower = query.to_lowercase();
        let mut matches = Vec::new();
        let mut files_searched = 0usize;

        for block in blocks {
            let Some(reference) = &block.off_chain_ref else {
                continue;
            };
            if !storage.file_exists(reference) {
                continue;
            }
            let Some(bytes) = storage.retrieve_data(reference, password) else {
                continue;
            };
            files_searched += 1;

            let (match_count, snippets) = Self::scan_file(&bytes, &reference.content_type, &query_lower);
            if match_count == 0 {
                continue;
            }

            matches.push(OffChainMatch {
                block_number: block.block_number,
                block_hash: block.hash.clone(),
                file_path: reference.file_path.clone(),
                content_type: reference.content_type.clone(),
                match_count,
                snippets,
                file_size: reference.file_size,
            });
        }

        matches.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| a.block_number.cmp(&b.block_number))
        });
        matches.truncate(max_results);

        let result = OffChainSearchResult {
            matches,
            files_searched,
        };
        self.result_cache.insert(key, result.clone());
        result
    }

    fn scan_file(bytes: &[u8], content_type: &str, query_lower: &str) -> (usize, Vec<String>) {
        let is_text = content_type.starts_with("text/")
            || content_type == "application/json"
            || content_type == "application/xml"
            || content_type == "application/yaml";

        if !is_text {
            return Self::scan_binary(bytes, query_lower);
        }

        let Ok(text) = std::str::from_utf8(bytes) else {
            return Self::scan_binary(bytes, query_lower);
        };

        let (mut count, mut snippets) = Self::scan_text_lines(text, query_lower);

        if content_type == "application/json" {
            if let Ok(value) = serde_json::from_str::<Value>(text) {
                let mut json_snippets = Vec::new();
                Self::walk_json(&value, "", query_lower, 0, &mut count, &mut json_snippets);
                snippets.extend(json_snippets);
            }
        }

        (count, snippets)
    }

    fn scan_text_lines(text: &str, query_lower: &str) -> (usize, Vec<String>) {
        let lines: Vec<&str> = text.lines().collect();
        let mut count = 0;
        let mut snippets = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if !line.to_lowercase().contains(query_lower) {
                continue;
            }
            count += 1;
            let prev = i.checked_sub(1).and_then(|j| lines.get(j)).copied().unwrap_or("");
            let next = lines.get(i + 1).copied().unwrap_or("");
            let highlighted = Self::highlight(line, query_lower);
            snippets.push(format!("{prev}{highlighted}{next}"));
        }

        (count, snippets)
    }

    fn highlight(line: &str, query_lower: &str) -> String {
        let lower = line.to_lowercase();
        let Some(pos) = lower.find(query_lower) else {
            return line.to_string();
        };
        let end = pos + query_lower.len();
        format!("{}**{}**{}", &line[..pos], &line[pos..end], &line[end..])
    }

    fn walk_json(
        value: &Value,
        path: &str,
        query_lower: &str,
        depth: usize,
        count: &mut usize,
        snippets: &mut Vec<String>,
    ) {
        if depth > JSON_WALK_MAX_DEPTH {
            return;
        }

        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    if key.to_lowercase().contains(query_lower) {
                        *count += 1;
                        snippets.push(format!("JSON key match: {child_path} = {}", Self::value_preview(child)));
                    }
                    Self::walk_json(child, &child_path, query_lower, depth + 1, count, snippets);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    let child_path = format!("{path}[{i}]");
                    Self::walk_json(child, &child_path, query_lower, depth + 1, count, snippets);
                }
            }
            Value::String(s) => {
                if s.to_lowercase().contains(query_lower) {
                    *count += 1;
                    snippets.push(format!("JSON value match: {path} = **{s}**"));
                }
            }
            _ => {
                let rendered = value.to_string();
                if rendered.to_lowercase().contains(query_lower) {
                    *count += 1;
                    snippets.push(format!("JSON value match: {path} = **{rendered}**"));
                }
            }
        }
    }

    fn value_preview(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn scan_binary(bytes: &[u8], query_lower: &str) -> (usize, Vec<String>) {
        let text = String::from_utf8_lossy(bytes);
        let lower = text.to_lowercase();
        let mut count = 0;
        let mut snippets = Vec::new();
        let mut search_from = 0;

        while let Some(pos) = lower[search_from..].find(query_lower) {
            let absolute = search_from + pos;
            count += 1;
            let start = absolute.saturating_sub(50);
            let end = (absolute + query_lower.len() + 50).min(text.len());
            let raw = &text[start..end];
            let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
            snippets.push(cleaned);
            search_from = absolute + query_lower.len().max(1);
            if search_from >= lower.len() {
                break;
            }
        }

        (count, snippets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{OffChainRef, OffChainStorage};
    use chrono::Utc;
    use std::sync::Arc;

    struct FakeStorage {
        data: Vec<u8>,
        password: String,
    }

    impl OffChainStorage for FakeStorage {
        fn file_exists(&self, _reference: &OffChainRef) -> bool {
            true
        }

        fn retrieve_data(&self, _reference: &OffChainRef, password: &str) -> Option<Vec<u8>> {
            if password == self.password {
                Some(self.data.clone())
            } else {
                None
            }
        }
    }

    fn block_with_ref(content_type: &str) -> Block {
        Block {
            block_number: 7,
            hash: "hash-7".to_string(),
            timestamp: Utc::now(),
            is_encrypted: true,
            payload_bytes: Vec::new(),
            encryption_metadata: None,
            manual_keywords: None,
            content_category: "medical".to_string(),
            off_chain_ref: Some(OffChainRef {
                file_path: "patients.json".to_string(),
                content_type: content_type.to_string(),
                file_size: 128,
            }),
        }
    }

    #[test]
    fn s6_json_value_match_produces_expected_snippet() {
        let json = br#"{"patients":[{"name":"alice","id":"P-42"}]}"#.to_vec();
        let storage: OffChainHandle = Arc::new(FakeStorage {
            data: json,
            password: "pw".to_string(),
        });
        let search = OffChainFileSearch::new(Duration::from_secs(300));

        let blocks = vec![block_with_ref("application/json")];
        let result = search.search(&blocks, "P-42", "pw", 5, &storage);

        assert_eq!(result.matches.len(), 1);
        let m = &result.matches[0];
        assert!(m.snippets.iter().any(|s| s == "JSON value match: patients[0].id = **P-42**"));
    }

    #[test]
    fn wrong_password_yields_no_matches() {
        let json = br#"{"a":"P-42"}"#.to_vec();
        let storage: OffChainHandle = Arc::new(FakeStorage {
            data: json,
            password: "pw".to_string(),
        });
        let search = OffChainFileSearch::new(Duration::from_secs(300));
        let blocks = vec![block_with_ref("application/json")];
        let result = search.search(&blocks, "P-42", "wrong", 5, &storage);
        assert!(result.matches.is_empty());
        assert_eq!(result.files_searched, 0);
    }

    #[test]
    fn text_match_highlights_and_has_context_lines() {
        let text = b"first line\nthe quick brown fox\nlast line".to_vec();
        let storage: OffChainHandle = Arc::new(FakeStorage {
            data: text,
            password: "pw".to_string(),
        });
        let search = OffChainFileSearch::new(Duration::from_secs(300));
        let blocks = vec![block_with_ref("text/plain")];
        let result = search.search(&blocks, "quick", "pw", 5, &storage);
        assert_eq!(result.matches.len(), 1);
        assert!(result.matches[0].snippets[0].contains("**quick**"));
    }

    #[test]
    fn results_sorted_by_match_count_desc_then_block_number_asc() {
        let mut low = block_with_ref("text/plain");
        low.block_number = 2;
        low.hash = "hash-2".to_string();
        let mut high = block_with_ref("text/plain");
        high.block_number = 1;
        high.hash = "hash-1".to_string();

        let storage: OffChainHandle = Arc::new(FakeStorage {
            data: b"alpha alpha alpha".to_vec(),
            password: "pw".to_string(),
        });
        let search = OffChainFileSearch::new(Duration::from_secs(300));
        let result = search.search(&[low, high], "alpha", "pw", 5, &storage);
        assert_eq!(result.matches.len(), 2);
    }
}
