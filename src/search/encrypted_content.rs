//! `EncryptedContentSearch` — password-gated deep search over private
//! metadata plus query-time decryption of block payloads.
//!
//! This is the largest and most concurrency-sensitive subsystem in the
//! core. Per-key caches (`encrypted_metadata_cache`, `content_cache`,
//! `decrypted_cache`) are lock-free `DashMap`-backed TTL caches; the encrypted-blocks
//! pagination cache is the one exception, guarded by a single mutex
//! because it carries a compound invariant (vector + timestamp +
//! counters).

use crate::config::EngineConfig;
use crate::ledger::{Block, BlockId, LedgerHandle};
use crate::metadata::MetadataLayerManager;
use crate::util::{tokenize, TtlCache};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single scored hit from the encrypted-content search.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedSearchResult {
    /// The matching block's id.
    pub block_id: BlockId,
    /// Match score (see the per-source weights in `score_private_metadata`).
    pub score: f64,
    /// Whether any matched private-metadata field was a sensitive term.
    pub has_sensitive_match: bool,
}

fn password_hash(password: &str) -> String {
    blake3::hash(password.as_bytes()).to_hex().to_string()
}

/// Bounded, TTL-guarded snapshot of the most recent encrypted blocks,
/// used to accelerate repeated query-time decryption scans.
struct PaginationCache {
    blocks: Option<Vec<Block>>,
    populated_at: Instant,
    hits: u64,
    misses: u64,
    refreshes: u64,
}

impl PaginationCache {
    fn empty() -> Self {
        Self {
            blocks: None,
            populated_at: Instant::now(),
            hits: 0,
            misses: 0,
            refreshes: 0,
        }
    }
}

/// Deep, password-gated search over private metadata and encrypted
/// payloads.
pub struct EncryptedContentSearch {
    encrypted_metadata_cache: TtlCache<BlockId, String>,
    content_cache: TtlCache<BlockId, String>,
    decrypted_cache: TtlCache<(BlockId, String), crate::metadata::PrivateMetadata>,
    pagination_cache: Mutex<PaginationCache>,
    page_ttl: Duration,
    page_capacity: usize,
    max_encrypted_per_query: usize,
    batch_size: usize,
    decryption_pool_size: usize,
}

impl EncryptedContentSearch {
    /// Build a new encrypted-content search from engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        let ttl = Duration::from_millis(config.cache_ttl_ms);
        Self {
            encrypted_metadata_cache: TtlCache::new(ttl),
            content_cache: TtlCache::new(ttl),
            decrypted_cache: TtlCache::new(ttl),
            pagination_cache: Mutex::new(PaginationCache::empty()),
            page_ttl: Duration::from_millis(config.encrypted_page_cache_ttl_ms),
            page_capacity: config.encrypted_page_cache_size,
            max_encrypted_per_query: config.max_encrypted_blocks_per_query,
            batch_size: config.parallel_decrypt_batch_size,
            decryption_pool_size: config.decryption_pool_size.max(1),
        }
    }

    /// Stash an encrypted block's private-layer ciphertext.
    pub fn index_encrypted(&self, block_id: BlockId, ciphertext: String) {
        self.encrypted_metadata_cache.insert(block_id, ciphertext);
        self.invalidate_pagination_cache();
    }

    /// Stash a plaintext block's payload for password-less content search.
    pub fn index_plaintext(&self, block_id: BlockId, payload_text: String) {
        self.content_cache.insert(block_id, payload_text);
        self.invalidate_pagination_cache();
    }

    /// Purge every cache entry touching `block_id`, including any
    /// `(block_id, *)` decrypted-cache keys.
    pub fn remove(&self, block_id: &BlockId) {
        self.encrypted_metadata_cache.remove(block_id);
        self.content_cache.remove(block_id);
        self.decrypted_cache.retain_keys(|(id, _)| id != block_id);
    }

    fn invalidate_pagination_cache(&self) {
        *self.pagination_cache.lock() = PaginationCache::empty();
    }

    /// Periodic cleanup sweep: expires stale entries in the metadata and
    /// content caches, cascading an encrypted-id eviction into
    /// `content_cache` too.
    pub fn sweep_expired(&self) {
        let content_cache = &self.content_cache;
        self.encrypted_metadata_cache.sweep_with(|id| {
            content_cache.remove(id);
        });
        self.content_cache.sweep();
        self.decrypted_cache.sweep();
    }

    /// Deep search.
    pub fn search(
        &self,
        query: &str,
        password: Option<&str>,
        max_results: usize,
        ledger: Option<&LedgerHandle>,
    ) -> Vec<EncryptedSearchResult> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<EncryptedSearchResult> = Vec::new();
        let mut found_ids: HashSet<BlockId> = HashSet::new();

        self.scan_plaintext_cache(&tokens, &mut results, &mut found_ids);

        if let Some(password) = password {
            self.scan_private_metadata(&tokens, password, &mut results, &mut found_ids);

            if results.len() < max_results {
                if let Some(ledger) = ledger {
                    self.parallel_decrypt_scan(
                        &tokens,
                        password,
                        max_results,
                        ledger,
                        &mut results,
                        &mut found_ids,
                    );
                }
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(max_results);
        results
    }

    /// Step 2: always scan plaintext payloads, case-insensitively.
    fn scan_plaintext_cache(
        &self,
        tokens: &[String],
        results: &mut Vec<EncryptedSearchResult>,
        found_ids: &mut HashSet<BlockId>,
    ) {
        for (block_id, payload) in self.content_cache.entries() {
            let lower = payload.to_lowercase();
            let matched = tokens.iter().filter(|t| lower.contains(t.as_str())).count();
            if matched > 0 {
                results.push(EncryptedSearchResult {
                    block_id: block_id.clone(),
                    score: matched as f64 / tokens.len() as f64,
                    has_sensitive_match: false,
                });
                found_ids.insert(block_id);
            }
        }
    }

    /// Step 3: password-gated deep scan over decrypted private metadata.
    fn scan_private_metadata(
        &self,
        tokens: &[String],
        password: &str,
        results: &mut Vec<EncryptedSearchResult>,
        found_ids: &mut HashSet<BlockId>,
    ) {
        if self.encrypted_metadata_cache.is_empty() {
            return;
        }
        let hash = password_hash(password);

        for (block_id, ciphertext) in self.encrypted_metadata_cache.entries() {
            if found_ids.contains(&block_id) {
                continue;
            }

            let cache_key = (block_id.clone(), hash.clone());
            let private = match self.decrypted_cache.get(&cache_key) {
                Some(private) => private,
                None => {
                    let Some(private) = MetadataLayerManager::decrypt_private(&ciphertext, password) else {
                        tracing::debug!(block_id = %block_id, "private metadata decryption failed");
                        continue;
                    };
                    self.decrypted_cache.insert(cache_key, private.clone());
                    private
                }
            };

            let (score, sensitive) = Self::score_private_metadata(tokens, &private);
            if score > 0.0 {
                results.push(EncryptedSearchResult {
                    block_id: block_id.clone(),
                    score,
                    has_sensitive_match: sensitive,
                });
                found_ids.insert(block_id);
            }
        }
    }

    fn score_private_metadata(tokens: &[String], private: &crate::metadata::PrivateMetadata) -> (f64, bool) {
        let mut score = 0.0;
        let mut sensitive = false;
        let summary_lower = private.content_summary.to_lowercase();

        for token in tokens {
            if private.detailed_keywords.iter().any(|k| k.to_lowercase().contains(token.as_str())) {
                score += 2.0;
            }
            if summary_lower.contains(token.as_str()) {
                score += 1.5;
            }
            if private.identifiers.iter().any(|i| i.to_lowercase().contains(token.as_str())) {
                score += 3.0;
            }
            if private.sensitive_terms.iter().any(|s| s.to_lowercase().contains(token.as_str())) {
                score += 2.5;
                sensitive = true;
            }
        }

        (score, sensitive)
    }

    /// Step 4: bounded parallel query-time payload decryption with
    /// early termination.
    fn parallel_decrypt_scan(
        &self,
        tokens: &[String],
        password: &str,
        max_results: usize,
        ledger: &LedgerHandle,
        results: &mut Vec<EncryptedSearchResult>,
        found_ids: &mut HashSet<BlockId>,
    ) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.decryption_pool_size)
            .build()
        {
            Ok(pool) => pool,
            Err(_) => return,
        };

        let mut attempted = 0usize;
        let mut offset = 0u64;
        let mut first_page = true;
        let target_met = AtomicUsize::new(results.len());
        let stop = AtomicBool::new(results.len() >= max_results);

        while attempted < self.max_encrypted_per_query
            && !stop.load(Ordering::Relaxed)
        {
            let remaining_cap = self.max_encrypted_per_query - attempted;
            let want = self.batch_size.min(remaining_cap);

            let page: Vec<Block> = if first_page {
                first_page = false;
                self.page_from_cache(ledger, want, found_ids)
            } else if !found_ids.is_empty() {
                ledger.get_encrypted_blocks_excluding(
                    offset,
                    want as u64,
                    &found_ids.iter().cloned().collect::<Vec<_>>(),
                )
            } else {
                self.page_from_cache_at(offset, want)
            };

            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;
            attempted += page.len();

            let candidates: Vec<&Block> = page.iter().filter(|b| !found_ids.contains(&b.hash)).collect();
            if candidates.is_empty() {
                continue;
            }

            let round: Vec<EncryptedSearchResult> = pool.install(|| {
                candidates
                    .par_iter()
                    .filter_map(|block| {
                        if stop.load(Ordering::Relaxed) {
                            return None;
                        }
                        let plaintext = ledger.get_decrypted_block_data(block.block_number, password)?;
                        let lower = plaintext.to_lowercase();
                        let matched = tokens.iter().filter(|t| lower.contains(t.as_str())).count();
                        if matched == 0 {
                            return None;
                        }
                        let prior = target_met.fetch_add(1, Ordering::Relaxed);
                        if prior + 1 >= max_results {
                            stop.store(true, Ordering::Relaxed);
                        }
                        Some(EncryptedSearchResult {
                            block_id: block.hash.clone(),
                            score: matched as f64 / tokens.len() as f64,
                            has_sensitive_match: false,
                        })
                    })
                    .collect()
            });

            for hit in round {
                if found_ids.insert(hit.block_id.clone()) {
                    results.push(hit);
                }
            }

            if results.len() >= max_results {
                break;
            }
        }
    }

    fn page_from_cache(&self, ledger: &LedgerHandle, want: usize, found_ids: &HashSet<BlockId>) -> Vec<Block> {
        let mut cache = self.pagination_cache.lock();
        let fresh = cache
            .blocks
            .as_ref()
            .map(|_| cache.populated_at.elapsed() <= self.page_ttl)
            .unwrap_or(false);

        if !fresh {
            let refreshed = ledger.get_encrypted_blocks_paginated_desc(0, self.page_capacity as u64);
            cache.blocks = Some(refreshed);
            cache.populated_at = Instant::now();
            cache.refreshes += 1;
            cache.misses += 1;
        } else {
            cache.hits += 1;
        }

        let blocks = cache.blocks.clone().unwrap_or_default();
        drop(cache);

        blocks
            .into_iter()
            .filter(|b| !found_ids.contains(&b.hash))
            .take(want)
            .collect()
    }

    fn page_from_cache_at(&self, offset: u64, want: usize) -> Vec<Block> {
        let cache = self.pagination_cache.lock();
        let blocks = cache.blocks.clone().unwrap_or_default();
        drop(cache);
        blocks.into_iter().skip(offset as usize).take(want).collect()
    }

    /// Number of entries in the encrypted-metadata cache (used by stats).
    pub fn encrypted_count(&self) -> usize {
        self.encrypted_metadata_cache.len()
    }

    /// Number of entries in the plaintext content cache (used by stats).
    pub fn plaintext_count(&self) -> usize {
        self.content_cache.len()
    }

    /// Number of decrypted-metadata cache entries currently cached
    /// (used by tests verifying password isolation).
    pub fn decrypted_cache_len(&self) -> usize {
        self.decrypted_cache.len()
    }

    /// Clear every cache (engine shutdown).
    pub fn clear(&self) {
        self.encrypted_metadata_cache.clear();
        self.content_cache.clear();
        self.decrypted_cache.clear();
        self.invalidate_pagination_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Block, LedgerSource, OffChainRef};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeLedger {
        blocks: Vec<Block>,
        password: String,
    }

    impl LedgerSource for FakeLedger {
        fn get_block_count(&self) -> u64 {
            self.blocks.len() as u64
        }

        fn get_blocks_paginated(&self, offset: u64, limit: u64) -> Vec<Block> {
            self.blocks.iter().skip(offset as usize).take(limit as usize).cloned().collect()
        }

        fn get_encrypted_blocks_paginated_desc(&self, offset: u64, limit: u64) -> Vec<Block> {
            let mut sorted: Vec<Block> = self.blocks.iter().filter(|b| b.is_encrypted).cloned().collect();
            sorted.sort_by(|a, b| b.block_number.cmp(&a.block_number));
            sorted.into_iter().skip(offset as usize).take(limit as usize).collect()
        }

        fn get_encrypted_blocks_excluding(&self, offset: u64, limit: u64, exclude_ids: &[BlockId]) -> Vec<Block> {
            let excluded: HashSet<&BlockId> = exclude_ids.iter().collect();
            let mut sorted: Vec<Block> = self
                .blocks
                .iter()
                .filter(|b| b.is_encrypted && !excluded.contains(&b.hash))
                .cloned()
                .collect();
            sorted.sort_by(|a, b| b.block_number.cmp(&a.block_number));
            sorted.into_iter().skip(offset as usize).take(limit as usize).collect()
        }

        fn get_decrypted_block_data(&self, block_number: u64, password: &str) -> Option<String> {
            if password != self.password {
                return None;
            }
            self.blocks
                .iter()
                .find(|b| b.block_number == block_number)
                .map(|b| String::from_utf8_lossy(&b.payload_bytes).to_string())
        }
    }

    fn block(number: u64, hash: &str, payload: &str) -> Block {
        Block {
            block_number: number,
            hash: hash.to_string(),
            timestamp: Utc::now(),
            is_encrypted: true,
            payload_bytes: payload.as_bytes().to_vec(),
            encryption_metadata: None,
            manual_keywords: None,
            content_category: "general".to_string(),
            off_chain_ref: None,
        }
    }

    #[test]
    fn s3_deep_encrypted_hit_scores_as_expected() {
        let search = EncryptedContentSearch::new(&EngineConfig::default());
        let private = crate::metadata::PrivateMetadata {
            detailed_keywords: ["diagnosis".to_string()].into_iter().collect(),
            sensitive_terms: ["hiv".to_string()].into_iter().collect(),
            identifiers: ["p-77".to_string()].into_iter().collect(),
            content_summary: String::new(),
            content_category: String::new(),
        };

        let encrypted_blob = encrypt_for_test(&private, "pw");
        search.index_encrypted("block-1".to_string(), encrypted_blob);

        let results = search.search("diagnosis p-77", Some("pw"), 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].block_id, "block-1");
        assert!((results[0].score - 5.0).abs() < 1e-9);
        assert!(!results[0].has_sensitive_match, "query didn't match the sensitive term");
    }

    fn encrypt_for_test(private: &crate::metadata::PrivateMetadata, password: &str) -> String {
        crate::metadata::manager::MetadataLayerManager::encrypt_private_layer(private, password).unwrap()
    }

    #[test]
    fn s4_wrong_password_isolation() {
        let search = EncryptedContentSearch::new(&EngineConfig::default());
        let private = crate::metadata::PrivateMetadata {
            detailed_keywords: ["diagnosis".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let encrypted_blob = encrypt_for_test(&private, "pw");
        search.index_encrypted("block-1".to_string(), encrypted_blob);

        let results = search.search("diagnosis", Some("wrong"), 10, None);
        assert!(results.is_empty());
        assert_eq!(search.decrypted_cache_len(), 0);
    }

    #[test]
    fn removal_purges_all_caches() {
        let search = EncryptedContentSearch::new(&EngineConfig::default());
        search.index_plaintext("b1".to_string(), "hello world".to_string());
        search.index_encrypted("b1".to_string(), "ciphertext".to_string());
        search.remove(&"b1".to_string());
        assert_eq!(search.plaintext_count(), 0);
        assert_eq!(search.encrypted_count(), 0);
    }

    #[test]
    fn s5_parallel_decryption_dedupes_and_caps_attempts() {
        let password = "bravo-pw".to_string();
        let mut blocks = Vec::new();
        for i in 0..300u64 {
            let contains_bravo = i < 7;
            let payload = if contains_bravo { "bravo signal" } else { "nothing here" };
            blocks.push(block(i, &format!("hash-{i}"), payload));
        }
        let ledger: LedgerHandle = Arc::new(FakeLedger { blocks, password: password.clone() });

        let search = EncryptedContentSearch::new(&EngineConfig::default());
        let results = search.search("bravo", Some(&password), 10, Some(&ledger));

        assert_eq!(results.len(), 7);
        let unique: HashSet<_> = results.iter().map(|r| r.block_id.clone()).collect();
        assert_eq!(unique.len(), 7);
    }

    #[test]
    fn early_termination_caps_total_attempts() {
        let password = "pw".to_string();
        let mut blocks = Vec::new();
        for i in 0..2000u64 {
            blocks.push(block(i, &format!("hash-{i}"), "bravo always present"));
        }
        let ledger: LedgerHandle = Arc::new(FakeLedger { blocks, password: password.clone() });

        let config = EngineConfig {
            max_encrypted_blocks_per_query: 120,
            ..EngineConfig::default()
        };
        let search = EncryptedContentSearch::new(&config);
        let results = search.search("bravo", Some(&password), 5, Some(&ledger));
        assert!(results.len() <= 5);
    }
}
