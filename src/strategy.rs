//! Query classification and strategy selection/composition.
//!
//! Strategies are modeled as a tagged variant with a single dispatch
//! site rather than a trait-object hierarchy: the composition logic
//! (cascade vs. parallel-merge) lives once, in `StrategyRouter::execute`,
//! instead of being scattered across polymorphic strategy classes.

use crate::config::{EngineConfig, SecurityLevel};
use crate::index::{FastIndex, ScoredBlock};
use crate::ledger::LedgerHandle;
use crate::search::{EncryptedContentSearch, EncryptedSearchResult};
use rayon::join;

/// Coarse query complexity, used to pick a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComplexity {
    /// At most two tokens and no special characters.
    Simple,
    /// Neither simple nor complex.
    Medium,
    /// More than five tokens, boolean words, parens, or an ISO date.
    Complex,
}

/// Which search algorithm(s) a query is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// FastIndex only.
    FastPublic,
    /// EncryptedContentSearch only.
    EncryptedContent,
    /// FastIndex first, EncryptedContentSearch only if it undershoots.
    HybridCascade,
    /// FastIndex and EncryptedContentSearch run concurrently, merged.
    ParallelMulti,
}

/// A single ranked hit, normalized across strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedResult {
    /// The matching block's id.
    pub block_id: String,
    /// Final score after any merge bonuses.
    pub score: f64,
    /// Whether a sensitive private-metadata term contributed to this hit.
    pub has_sensitive_match: bool,
}

/// Outcome of routing and executing a single query.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingResult {
    /// Ranked, deduplicated results.
    pub results: Vec<RoutedResult>,
    /// Which strategy actually produced `results`.
    pub strategy_used: Strategy,
    /// Set if the preferred strategy failed and the router fell back to
    /// `FAST_PUBLIC`; carries the original failure for observability.
    pub fallback_error: Option<String>,
}

fn classify(query: &str) -> QueryComplexity {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let lower = query.to_lowercase();
    let has_special = query.chars().any(|c| matches!(c, '*' | '?' | '"' | ':'));
    let has_boolean_word = [" and ", " or ", " not "].iter().any(|w| lower.contains(w));
    let has_parens = query.contains('(') || query.contains(')');
    let has_iso_date = is_iso_date_like(&lower);

    if tokens.len() > 5 || has_boolean_word || has_parens || has_iso_date {
        QueryComplexity::Complex
    } else if tokens.len() <= 2 && !has_special {
        QueryComplexity::Simple
    } else {
        QueryComplexity::Medium
    }
}

fn is_iso_date_like(text: &str) -> bool {
    let digits_dashes: Vec<char> = text.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
    let candidate: String = digits_dashes.into_iter().collect();
    candidate.len() >= 10
        && text
            .split_whitespace()
            .any(|w| w.len() == 10 && w.as_bytes()[4] == b'-' && w.as_bytes()[7] == b'-' && w.chars().all(|c| c.is_ascii_digit() || c == '-'))
}

/// Classifies queries and selects/composes the strategy to run them
/// against.
pub struct StrategyRouter;

impl StrategyRouter {
    /// Build a new router.
    pub fn new() -> Self {
        Self
    }

    /// Select the strategy for a query from its complexity, whether a
    /// password is available, and the configured security level.
    pub fn select(&self, query: &str, has_password: bool, config: &EngineConfig) -> Strategy {
        let complexity = classify(query);

        if config.security_level == SecurityLevel::Maximum && has_password {
            return Strategy::EncryptedContent;
        }
        if complexity == QueryComplexity::Complex && has_password {
            return Strategy::HybridCascade;
        }
        if complexity == QueryComplexity::Medium && has_password {
            return Strategy::EncryptedContent;
        }
        if config.security_level == SecurityLevel::Balanced && has_password {
            return Strategy::ParallelMulti;
        }
        Strategy::FastPublic
    }

    /// Classify, select, and execute a strategy, falling back to
    /// `FAST_PUBLIC` on any failure.
    pub fn route(
        &self,
        query: &str,
        password: Option<&str>,
        max_results: usize,
        config: &EngineConfig,
        fast_index: &FastIndex,
        encrypted_search: &EncryptedContentSearch,
        ledger: Option<&LedgerHandle>,
    ) -> RoutingResult {
        let strategy = self.select(query, password.is_some(), config);

        match self.execute(strategy, query, password, max_results, config, fast_index, encrypted_search, ledger) {
            Ok(results) => RoutingResult {
                results,
                strategy_used: strategy,
                fallback_error: None,
            },
            Err(reason) => {
                tracing::warn!(%reason, ?strategy, "strategy execution failed, falling back to fast public search");
                let fallback = fast_index
                    .search_fast(query, max_results)
                    .into_iter()
                    .map(Self::from_scored_block)
                    .collect();
                RoutingResult {
                    results: fallback,
                    strategy_used: Strategy::FastPublic,
                    fallback_error: Some(reason),
                }
            }
        }
    }

    fn execute(
        &self,
        strategy: Strategy,
        query: &str,
        password: Option<&str>,
        max_results: usize,
        config: &EngineConfig,
        fast_index: &FastIndex,
        encrypted_search: &EncryptedContentSearch,
        ledger: Option<&LedgerHandle>,
    ) -> Result<Vec<RoutedResult>, String> {
        match strategy {
            Strategy::FastPublic => Ok(fast_index
                .search_fast(query, max_results)
                .into_iter()
                .map(Self::from_scored_block)
                .collect()),

            Strategy::EncryptedContent => {
                // Maximum security promises exhaustive encrypted coverage,
                // which requires ledger-backed query-time decryption of
                // blocks not yet indexed. Without a ledger that promise
                // can't be kept, so treat it as a strategy failure rather
                // than silently returning partial, cache-only results.
                if config.security_level == SecurityLevel::Maximum && ledger.is_none() {
                    return Err("maximum security level requires a ledger for exhaustive encrypted search, but none is configured".to_string());
                }
                Ok(encrypted_search
                    .search(query, password, max_results, ledger)
                    .into_iter()
                    .map(Self::from_encrypted_result)
                    .collect())
            }

            Strategy::HybridCascade => {
                let fast: Vec<RoutedResult> = fast_index
                    .search_fast(query, max_results)
                    .into_iter()
                    .map(Self::from_scored_block)
                    .collect();

                if fast.len() >= max_results / 2 {
                    return Ok(fast);
                }

                let deep: Vec<RoutedResult> = encrypted_search
                    .search(query, password, max_results, ledger)
                    .into_iter()
                    .map(Self::from_encrypted_result)
                    .collect();

                Ok(Self::merge_preferring_first(fast, deep, max_results))
            }

            Strategy::ParallelMulti => {
                let (fast, deep) = join(
                    || fast_index.search_fast(query, max_results),
                    || encrypted_search.search(query, password, max_results, ledger),
                );
                let fast: Vec<RoutedResult> = fast.into_iter().map(Self::from_scored_block).collect();
                let deep: Vec<RoutedResult> = deep.into_iter().map(Self::from_encrypted_result).collect();
                Ok(Self::merge_preferring_higher_score(fast, deep, max_results))
            }
        }
    }

    fn merge_preferring_first(primary: Vec<RoutedResult>, secondary: Vec<RoutedResult>, max_results: usize) -> Vec<RoutedResult> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();
        for result in primary.into_iter().chain(secondary) {
            if seen.insert(result.block_id.clone()) {
                merged.push(result);
            }
        }
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(max_results);
        merged
    }

    fn merge_preferring_higher_score(a: Vec<RoutedResult>, b: Vec<RoutedResult>, max_results: usize) -> Vec<RoutedResult> {
        let mut by_id: std::collections::HashMap<String, RoutedResult> = std::collections::HashMap::new();
        for result in a.into_iter().chain(b) {
            by_id
                .entry(result.block_id.clone())
                .and_modify(|existing| {
                    if result.score > existing.score {
                        *existing = result.clone();
                    }
                })
                .or_insert(result);
        }
        let mut merged: Vec<RoutedResult> = by_id.into_values().collect();
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(max_results);
        merged
    }

    fn from_scored_block(block: ScoredBlock) -> RoutedResult {
        RoutedResult {
            block_id: block.block_id,
            score: block.score,
            has_sensitive_match: false,
        }
    }

    fn from_encrypted_result(result: EncryptedSearchResult) -> RoutedResult {
        RoutedResult {
            block_id: result.block_id,
            score: result.score,
            has_sensitive_match: result.has_sensitive_match,
        }
    }
}

impl Default for StrategyRouter {
    fn default() -> Self {
        Self::new()
    }
}
