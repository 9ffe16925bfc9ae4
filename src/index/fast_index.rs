//! In-memory inverted index over public metadata.
//!
//! Posting lists are `DashMap<String, DashSet<BlockId>>`: reads never
//! take a global lock, and writes only linearize on the shard touched by a given
//! key.

use crate::ledger::BlockId;
use crate::metadata::BlockMetadataLayers;
use crate::util::{fuzzy_score, tokenize};
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Score contribution of an exact token match.
const EXACT_SCORE: f64 = 3.0;
/// Weight applied to the metadata-richness tiebreak bonus.
const RICHNESS_WEIGHT: f64 = 0.1;

/// A single scored search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBlock {
    /// The matching block's id.
    pub block_id: BlockId,
    /// Aggregate score (exact + fuzzy + richness).
    pub score: f64,
}

/// The fast, always-available inverted index over public metadata.
#[derive(Default)]
pub struct FastIndex {
    keyword_index: DashMap<String, DashSet<BlockId>>,
    time_index: DashMap<String, DashSet<BlockId>>,
    content_type_index: DashMap<String, DashSet<BlockId>>,
    blocks: DashMap<BlockId, BlockMetadataLayers>,
    insertion_seq: DashMap<BlockId, u64>,
    seq_counter: AtomicU64,
}

impl FastIndex {
    /// Construct an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index (or re-index) a block. Re-indexing the same `block_id`
    /// first removes its prior postings so the result is byte-identical
    /// to a single call.
    pub fn index(&self, block_id: BlockId, layers: BlockMetadataLayers) {
        self.remove(&block_id);

        for keyword in &layers.public_layer.general_keywords {
            self.keyword_index
                .entry(keyword.clone())
                .or_insert_with(DashSet::new)
                .insert(block_id.clone());
        }
        if !layers.public_layer.time_range.is_empty() {
            self.time_index
                .entry(layers.public_layer.time_range.clone())
                .or_insert_with(DashSet::new)
                .insert(block_id.clone());
        }
        if !layers.public_layer.content_type.is_empty() {
            self.content_type_index
                .entry(layers.public_layer.content_type.clone())
                .or_insert_with(DashSet::new)
                .insert(block_id.clone());
        }

        self.insertion_seq
            .entry(block_id.clone())
            .or_insert_with(|| self.seq_counter.fetch_add(1, Ordering::Relaxed));
        self.blocks.insert(block_id, layers);
    }

    /// Remove a block from every posting list, pruning any list that
    /// becomes empty.
    pub fn remove(&self, block_id: &BlockId) {
        let Some((_, layers)) = self.blocks.remove(block_id) else {
            return;
        };

        for keyword in &layers.public_layer.general_keywords {
            Self::remove_from_posting(&self.keyword_index, keyword, block_id);
        }
        Self::remove_from_posting(&self.time_index, &layers.public_layer.time_range, block_id);
        Self::remove_from_posting(&self.content_type_index, &layers.public_layer.content_type, block_id);
    }

    fn remove_from_posting(index: &DashMap<String, DashSet<BlockId>>, key: &str, block_id: &BlockId) {
        if let Some(set) = index.get(key) {
            set.remove(block_id);
            let is_empty = set.is_empty();
            drop(set);
            if is_empty {
                index.remove(key);
            }
        }
    }

    /// Ranked exact + fuzzy keyword search.
    pub fn search_fast(&self, query: &str, max_results: usize) -> Vec<ScoredBlock> {
        self.search_filtered(query, max_results, |_| true)
    }

    /// Like [`Self::search_fast`] but restricted to a single content type.
    pub fn search_by_content_type(&self, query: &str, content_type: &str, max_results: usize) -> Vec<ScoredBlock> {
        let allowed: Option<DashSet<BlockId>> = self
            .content_type_index
            .get(content_type)
            .map(|set| set.iter().map(|e| (*e).clone()).collect());
        self.search_filtered(query, max_results, |id| {
            allowed.as_ref().map(|set| set.contains(id)).unwrap_or(false)
        })
    }

    /// Like [`Self::search_fast`] but restricted to a single ISO time range.
    pub fn search_by_time_range(&self, query: &str, time_range: &str, max_results: usize) -> Vec<ScoredBlock> {
        let allowed: Option<DashSet<BlockId>> = self
            .time_index
            .get(time_range)
            .map(|set| set.iter().map(|e| (*e).clone()).collect());
        self.search_filtered(query, max_results, |id| {
            allowed.as_ref().map(|set| set.contains(id)).unwrap_or(false)
        })
    }

    fn search_filtered<F>(&self, query: &str, max_results: usize, filter: F) -> Vec<ScoredBlock>
    where
        F: Fn(&BlockId) -> bool,
    {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<BlockId, f64> = HashMap::new();

        for token in &tokens {
            if let Some(exact) = self.keyword_index.get(token) {
                for block_id in exact.iter() {
                    *scores.entry(block_id.clone()).or_insert(0.0) += EXACT_SCORE;
                }
            }

            for entry in self.keyword_index.iter() {
                let indexed_keyword = entry.key();
                if indexed_keyword == token {
                    continue;
                }
                if let Some(fuzzy) = fuzzy_score(token, indexed_keyword) {
                    for block_id in entry.value().iter() {
                        *scores.entry(block_id.clone()).or_insert(0.0) += fuzzy;
                    }
                }
            }
        }

        for (block_id, score) in scores.iter_mut() {
            if let Some(layers) = self.blocks.get(block_id) {
                let has_private = layers.encrypted_private_layer.is_some();
                *score += RICHNESS_WEIGHT * layers.public_layer.richness(has_private);
            }
        }

        let mut results: Vec<ScoredBlock> = scores
            .into_iter()
            .filter(|(id, _)| filter(id))
            .map(|(block_id, score)| ScoredBlock { block_id, score })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let seq_a = self.insertion_seq.get(&a.block_id).map(|v| *v).unwrap_or(u64::MAX);
                    let seq_b = self.insertion_seq.get(&b.block_id).map(|v| *v).unwrap_or(u64::MAX);
                    seq_a.cmp(&seq_b)
                })
        });
        results.truncate(max_results);
        results
    }

    /// Whether `block_id` is currently indexed.
    pub fn contains(&self, block_id: &BlockId) -> bool {
        self.blocks.contains_key(block_id)
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the index holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
