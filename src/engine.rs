//! `SearchEngine` — the public façade composing every subsystem.

use crate::config::EngineConfig;
use crate::error::{SearchCoreError, SearchCoreResult};
use crate::index::FastIndex;
use crate::ledger::{Block, BlockId, LedgerHandle, OffChainHandle};
use crate::metadata::MetadataLayerManager;
use crate::password_registry::PasswordRegistry;
use crate::search::{EncryptedContentSearch, OffChainFileSearch, OnChainContentSearch};
use crate::strategy::{RoutedResult, Strategy, StrategyRouter};
use std::time::Duration;

/// A single ranked result returned across the façade boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching block's id.
    pub block_id: BlockId,
    /// Final score.
    pub score: f64,
    /// Whether a sensitive private-metadata term contributed to this hit.
    pub has_sensitive_match: bool,
}

impl From<RoutedResult> for SearchHit {
    fn from(r: RoutedResult) -> Self {
        Self {
            block_id: r.block_id,
            score: r.score,
            has_sensitive_match: r.has_sensitive_match,
        }
    }
}

/// Outcome of a `search` call: possibly-partial results plus which
/// strategy actually produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Ranked, deduplicated hits.
    pub hits: Vec<SearchHit>,
    /// The strategy that produced `hits`.
    pub strategy_used: Strategy,
    /// Present only when the preferred strategy failed and the router
    /// fell back to `FAST_PUBLIC`.
    pub fallback_error: Option<String>,
}

/// Indexing/search/removal statistics exposed for observability.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Blocks successfully indexed.
    pub blocks_indexed: u64,
    /// Blocks that degraded to minimal metadata during indexing.
    pub failed_index_count: u64,
    /// Blocks removed.
    pub blocks_removed: u64,
}

/// The encrypted multi-layer search core's public façade.
pub struct SearchEngine {
    config: EngineConfig,
    fast_index: FastIndex,
    encrypted_search: EncryptedContentSearch,
    onchain_search: OnChainContentSearch,
    offchain_search: OffChainFileSearch,
    router: StrategyRouter,
    passwords: PasswordRegistry,
    ledger: Option<LedgerHandle>,
    offchain_storage: Option<OffChainHandle>,
    stats: parking_lot::Mutex<EngineStats>,
}

impl SearchEngine {
    /// Construct an engine with the given configuration and optional
    /// ledger/off-chain collaborators. The engine never owns either; it
    /// only holds the capability handle it was given at construction.
    pub fn new(config: EngineConfig, ledger: Option<LedgerHandle>, offchain_storage: Option<OffChainHandle>) -> Self {
        let offchain_ttl = Duration::from_millis(config.cache_ttl_ms);
        Self {
            encrypted_search: EncryptedContentSearch::new(&config),
            offchain_search: OffChainFileSearch::new(offchain_ttl),
            fast_index: FastIndex::new(),
            onchain_search: OnChainContentSearch::new(),
            router: StrategyRouter::new(),
            passwords: PasswordRegistry::new(),
            ledger,
            offchain_storage,
            config,
            stats: parking_lot::Mutex::new(EngineStats::default()),
        }
    }

    /// Index (or re-index) a single block.
    ///
    /// Indexing policy: if the block carries user-defined keywords, they
    /// go entirely to the private layer for encrypted blocks or entirely
    /// to the public layer for plaintext blocks; otherwise the engine
    /// falls back to `MetadataLayerManager`'s heuristic indexing.
    pub fn index_block(&self, block: &Block, password: Option<&str>) {
        // A re-index call (e.g. from `index_blockchain`'s periodic
        // re-sweep) may not carry the password again; fall back to the
        // one registered the first time this block was indexed.
        let effective_password = password.map(str::to_string).or_else(|| self.passwords.get(&block.hash));

        if let Some(password) = &effective_password {
            self.passwords.register(block.hash.clone(), password.clone());
        }

        let (user_public_terms, user_private_terms) = match &block.manual_keywords {
            Some(terms) if block.is_encrypted => (None, Some(terms.clone())),
            Some(terms) => (Some(terms.clone()), None),
            None => (None, None),
        };

        let layers = MetadataLayerManager::build(
            block,
            &self.config,
            effective_password.as_deref(),
            user_public_terms.as_deref(),
            user_private_terms.as_deref(),
        );

        if layers.public_layer.general_keywords.is_empty() && layers.encrypted_private_layer.is_none() {
            self.record_failed_index();
        }

        if let Some(ciphertext) = &layers.encrypted_private_layer {
            self.encrypted_search.index_encrypted(block.hash.clone(), ciphertext.clone());
        }
        if !block.is_encrypted {
            if let Ok(text) = String::from_utf8(block.payload_bytes.clone()) {
                self.encrypted_search.index_plaintext(block.hash.clone(), text);
            }
        }

        self.fast_index.index(block.hash.clone(), layers);
        self.record_indexed();
    }

    /// Page through the entire ledger via `get_blocks_paginated`, indexing
    /// every block.
    pub fn index_blockchain(&self, ledger: &LedgerHandle, password: Option<&str>) {
        let total = ledger.get_block_count();
        let mut offset = 0u64;
        const PAGE_SIZE: u64 = 500;

        while offset < total {
            let page = ledger.get_blocks_paginated(offset, PAGE_SIZE);
            if page.is_empty() {
                break;
            }
            for block in &page {
                self.index_block(block, password);
            }
            offset += page.len() as u64;
        }
    }

    /// Remove a block from every index and cache.
    pub fn remove_block(&self, block_id: &BlockId) {
        self.fast_index.remove(block_id);
        self.encrypted_search.remove(block_id);
        self.passwords.remove(block_id);
        self.stats.lock().blocks_removed += 1;
    }

    /// Route and execute a search using the classified, composed strategy.
    pub fn search(&self, query: &str, password: Option<&str>, max_results: usize) -> SearchCoreResult<SearchOutcome> {
        self.validate_query(query, max_results)?;

        let routing = self.router.route(
            query,
            password,
            max_results,
            &self.config,
            &self.fast_index,
            &self.encrypted_search,
            self.ledger.as_ref(),
        );

        Ok(SearchOutcome {
            hits: routing.results.into_iter().map(SearchHit::from).collect(),
            strategy_used: routing.strategy_used,
            fallback_error: routing.fallback_error,
        })
    }

    /// Search using only the fast public index.
    pub fn search_public_only(&self, query: &str, max_results: usize) -> SearchCoreResult<Vec<SearchHit>> {
        self.validate_query(query, max_results)?;
        Ok(self
            .fast_index
            .search_fast(query, max_results)
            .into_iter()
            .map(|b| SearchHit {
                block_id: b.block_id,
                score: b.score,
                has_sensitive_match: false,
            })
            .collect())
    }

    /// Search using only the encrypted-content subsystem. Requires a
    /// password.
    pub fn search_encrypted_only(&self, query: &str, password: &str, max_results: usize) -> SearchCoreResult<Vec<SearchHit>> {
        self.validate_query(query, max_results)?;
        if password.trim().is_empty() {
            return Err(SearchCoreError::InvalidQuery("password required for encrypted-only search".to_string()));
        }
        Ok(self
            .encrypted_search
            .search(query, Some(password), max_results, self.ledger.as_ref())
            .into_iter()
            .map(SearchHit::from)
            .collect())
    }

    /// Run `EncryptedContentSearch`, then `OnChainContentSearch`, then
    /// `OffChainFileSearch` over blocks with off-chain references; merge
    /// by id (first wins) and add the configured on-chain/off-chain
    /// bonuses before the final sort and truncation.
    pub fn search_exhaustive_offchain(
        &self,
        query: &str,
        password: &str,
        max_results: usize,
        candidate_blocks: &[Block],
    ) -> SearchCoreResult<Vec<SearchHit>> {
        self.validate_query(query, max_results)?;
        if password.trim().is_empty() {
            return Err(SearchCoreError::InvalidQuery("password required for exhaustive search".to_string()));
        }

        let mut merged: Vec<SearchHit> = self
            .encrypted_search
            .search(query, Some(password), max_results, self.ledger.as_ref())
            .into_iter()
            .map(SearchHit::from)
            .collect();
        let mut seen: std::collections::HashSet<BlockId> = merged.iter().map(|h| h.block_id.clone()).collect();

        for hit in self.onchain_search.search(candidate_blocks, query, Some(password), max_results) {
            if seen.insert(hit.block_id.clone()) {
                merged.push(SearchHit {
                    block_id: hit.block_id,
                    score: hit.score + self.config.onchain_bonus,
                    has_sensitive_match: false,
                });
            }
        }

        if let Some(storage) = &self.offchain_storage {
            let off_blocks: Vec<Block> = candidate_blocks.iter().filter(|b| b.off_chain_ref.is_some()).cloned().collect();
            let offchain_result = self.offchain_search.search(&off_blocks, query, password, max_results, storage);
            for m in offchain_result.matches {
                if seen.insert(m.block_hash.clone()) {
                    merged.push(SearchHit {
                        block_id: m.block_hash,
                        score: m.match_count as f64 + self.config.offchain_bonus,
                        has_sensitive_match: false,
                    });
                }
            }
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(max_results);
        Ok(merged)
    }

    /// Periodic maintenance: sweep expired cache entries.
    pub fn sweep_expired(&self) {
        self.encrypted_search.sweep_expired();
    }

    /// Snapshot of engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.lock().clone()
    }

    /// Whether `block_id` was indexed with a password, so a caller can
    /// tell an encrypted search came back empty for lack of a password
    /// apart from a genuine no-match.
    pub fn is_password_protected(&self, block_id: &BlockId) -> bool {
        self.passwords.contains(block_id)
    }

    /// Shut down the engine: clears every cache and the password
    /// registry (whose entries are zeroed on drop).
    pub fn shutdown(&self) {
        self.encrypted_search.clear();
        self.passwords.clear();
    }

    fn validate_query(&self, query: &str, max_results: usize) -> SearchCoreResult<()> {
        if query.trim().is_empty() {
            return Ok(());
        }
        if max_results == 0 {
            return Err(SearchCoreError::InvalidQuery("max_results must be positive".to_string()));
        }
        Ok(())
    }

    fn record_indexed(&self) {
        self.stats.lock().blocks_indexed += 1;
    }

    fn record_failed_index(&self) {
        self.stats.lock().failed_index_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerSource, OffChainRef, OffChainStorage};
    use chrono::Utc;
    use std::sync::Arc;

    struct EmptyLedger;
    impl LedgerSource for EmptyLedger {
        fn get_block_count(&self) -> u64 {
            0
        }
        fn get_blocks_paginated(&self, _offset: u64, _limit: u64) -> Vec<Block> {
            Vec::new()
        }
        fn get_encrypted_blocks_paginated_desc(&self, _offset: u64, _limit: u64) -> Vec<Block> {
            Vec::new()
        }
        fn get_encrypted_blocks_excluding(&self, _offset: u64, _limit: u64, _exclude_ids: &[BlockId]) -> Vec<Block> {
            Vec::new()
        }
        fn get_decrypted_block_data(&self, _block_number: u64, _password: &str) -> Option<String> {
            None
        }
    }

    fn plaintext_block(hash: &str, payload: &str) -> Block {
        Block {
            block_number: 1,
            hash: hash.to_string(),
            timestamp: Utc::now(),
            is_encrypted: false,
            payload_bytes: payload.as_bytes().to_vec(),
            encryption_metadata: None,
            manual_keywords: None,
            content_category: "finance".to_string(),
            off_chain_ref: None,
        }
    }

    #[test]
    fn empty_query_returns_empty_results_no_error() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let outcome = engine.search("   ", None, 10).unwrap();
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn search_encrypted_only_without_password_is_invalid_query() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let result = engine.search_encrypted_only("diagnosis", "", 10);
        assert!(matches!(result, Err(SearchCoreError::InvalidQuery(_))));
    }

    #[test]
    fn s1_index_and_search_public_only_roundtrips() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let block = plaintext_block("abc", "invoice 2024 eur payment due");
        engine.index_block(&block, None);

        let hits = engine.search_public_only("invoice 2024", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].block_id, "abc");
    }

    #[test]
    fn remove_block_purges_fast_index() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let block = plaintext_block("abc", "invoice payment");
        engine.index_block(&block, None);
        engine.remove_block(&"abc".to_string());
        let hits = engine.search_public_only("invoice", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn index_blockchain_walks_empty_ledger_without_panicking() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let ledger: LedgerHandle = Arc::new(EmptyLedger);
        engine.index_blockchain(&ledger, None);
        assert_eq!(engine.stats().blocks_indexed, 0);
    }

    #[test]
    fn reindexing_without_a_password_reuses_the_registered_one() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let mut block = plaintext_block("abc", "");
        block.is_encrypted = true;
        block.manual_keywords = Some(vec!["diagnosis".to_string()]);
        engine.index_block(&block, Some("pw"));

        // Re-index without the password; the registry should supply it.
        engine.index_block(&block, None);

        let hits = engine.search_encrypted_only("diagnosis", "pw", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn is_password_protected_reflects_the_registry() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let plain = plaintext_block("abc", "invoice");
        engine.index_block(&plain, None);
        assert!(!engine.is_password_protected(&"abc".to_string()));

        let mut encrypted = plaintext_block("def", "");
        encrypted.is_encrypted = true;
        encrypted.manual_keywords = Some(vec!["diagnosis".to_string()]);
        engine.index_block(&encrypted, Some("pw"));
        assert!(engine.is_password_protected(&"def".to_string()));
    }

    #[test]
    fn shutdown_clears_passwords_and_caches() {
        let engine = SearchEngine::new(EngineConfig::default(), None, None);
        let block = plaintext_block("abc", "hello");
        engine.index_block(&block, Some("pw"));
        engine.shutdown();
        assert!(engine.search_encrypted_only("hello", "pw", 10).unwrap().is_empty());
    }

    struct FakeOffChainStorage;
    impl OffChainStorage for FakeOffChainStorage {
        fn file_exists(&self, _reference: &OffChainRef) -> bool {
            true
        }
        fn retrieve_data(&self, _reference: &OffChainRef, password: &str) -> Option<Vec<u8>> {
            if password == "pw" {
                Some(br#"{"patients":[{"name":"alice","id":"P-42"}]}"#.to_vec())
            } else {
                None
            }
        }
    }

    #[test]
    fn s6_exhaustive_offchain_search_applies_bonus() {
        let storage: OffChainHandle = Arc::new(FakeOffChainStorage);
        let engine = SearchEngine::new(EngineConfig::default(), None, Some(storage));

        let mut block = plaintext_block("b1", "");
        block.is_encrypted = true;
        block.off_chain_ref = Some(OffChainRef {
            file_path: "patients.json".to_string(),
            content_type: "application/json".to_string(),
            file_size: 64,
        });

        let hits = engine.search_exhaustive_offchain("P-42", "pw", 5, &[block]).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score >= 20.0);
    }
}
