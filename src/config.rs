//! Engine-wide configuration surface.

use serde::{Deserialize, Serialize};

/// Strategy-selection security posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Always run the encrypted deep search when a password is present.
    Maximum,
    /// Run fast public and encrypted search in parallel.
    Balanced,
    /// Prefer the fast public index; only deep-search medium/complex queries.
    Performance,
}

impl Default for SecurityLevel {
    fn default() -> Self {
        SecurityLevel::Performance
    }
}

/// Tunable knobs for the search core.
///
/// `onchain_bonus` and `offchain_bonus` are empirically-tuned merge
/// bonuses; they are configuration fields rather than literals so a
/// deployer can retune them without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Strategy-selection posture.
    pub security_level: SecurityLevel,
    /// Worker count for indexing tasks.
    pub indexing_pool_size: usize,
    /// Worker count for parallel query-time decryption.
    pub decryption_pool_size: usize,
    /// TTL, in milliseconds, for content/metadata caches.
    pub cache_ttl_ms: u64,
    /// TTL, in milliseconds, for the encrypted-blocks pagination cache.
    pub encrypted_page_cache_ttl_ms: u64,
    /// Capacity of the encrypted-blocks pagination cache.
    pub encrypted_page_cache_size: usize,
    /// Hard cap on blocks decrypted for a single query.
    pub max_encrypted_blocks_per_query: usize,
    /// Page size used when walking encrypted blocks for parallel decryption.
    pub parallel_decrypt_batch_size: usize,
    /// Score bonus applied to on-chain hits in the exhaustive merge.
    pub onchain_bonus: f64,
    /// Score bonus applied to off-chain hits in the exhaustive merge.
    pub offchain_bonus: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            security_level: SecurityLevel::default(),
            indexing_pool_size: 4,
            decryption_pool_size: num_cpus(),
            cache_ttl_ms: 300_000,
            encrypted_page_cache_ttl_ms: 60_000,
            encrypted_page_cache_size: 500,
            max_encrypted_blocks_per_query: 500,
            parallel_decrypt_batch_size: 50,
            onchain_bonus: 15.0,
            offchain_bonus: 20.0,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.indexing_pool_size, 4);
        assert_eq!(cfg.cache_ttl_ms, 300_000);
        assert_eq!(cfg.encrypted_page_cache_ttl_ms, 60_000);
        assert_eq!(cfg.encrypted_page_cache_size, 500);
        assert_eq!(cfg.max_encrypted_blocks_per_query, 500);
        assert_eq!(cfg.parallel_decrypt_batch_size, 50);
        assert_eq!(cfg.security_level, SecurityLevel::Performance);
    }
}
