//! Generic TTL-guarded concurrent cache.
//!
//! Grounded on this repo's multi-tier cache entry model
//! (`enterprise::cache::tier::CacheEntry`): each entry tracks its own
//! creation time and is considered expired once `created_at.elapsed() > ttl`.
//! Unlike the tiered L1/L2/L3 cache this is lifted from, the search core
//! only needs a single flat tier per map, so promotion/demotion is dropped.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    created_at: Instant,
    last_access: Instant,
}

/// A `DashMap`-backed cache where every entry expires `ttl` after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    map: DashMap<K, Entry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            map: DashMap::new(),
        }
    }

    /// Insert or overwrite a value, resetting its TTL clock.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        self.map.insert(
            key,
            Entry {
                value,
                created_at: now,
                last_access: now,
            },
        );
    }

    /// Fetch a value, returning `None` if absent or expired. A hit
    /// touches `last_access` but does not extend the TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut expired = false;
        let result = self.map.get_mut(key).and_then(|mut entry| {
            if entry.created_at.elapsed() > self.ttl {
                expired = true;
                None
            } else {
                entry.last_access = Instant::now();
                Some(entry.value.clone())
            }
        });
        if expired {
            self.map.remove(key);
        }
        result
    }

    /// Whether `key` is present (ignoring expiry, used by removal checks
    /// that need to purge regardless of staleness).
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Wall-clock instant of the entry's last access, if present and
    /// unexpired.
    pub fn last_access(&self, key: &K) -> Option<Instant> {
        self.map.get(key).and_then(|entry| {
            if entry.created_at.elapsed() > self.ttl {
                None
            } else {
                Some(entry.last_access)
            }
        })
    }

    /// Snapshot of all non-expired (key, value) pairs.
    pub fn entries(&self) -> Vec<(K, V)> {
        let ttl = self.ttl;
        self.map
            .iter()
            .filter(|e| e.created_at.elapsed() <= ttl)
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect()
    }

    /// Remove a single key, returning whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    /// Remove every entry for which `predicate` returns true.
    pub fn retain_keys<F>(&self, mut predicate: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.map.retain(|k, _| predicate(k));
    }

    /// Sweep expired entries; returns the number removed. Callers that
    /// also need to cascade removal into a sibling cache should use `sweep_with` instead.
    pub fn sweep(&self) -> usize {
        self.sweep_with(|_| {})
    }

    /// Sweep expired entries, invoking `on_evict` with each evicted key.
    pub fn sweep_with<F>(&self, mut on_evict: F) -> usize
    where
        F: FnMut(&K),
    {
        let ttl = self.ttl;
        let mut evicted = Vec::new();
        self.map.retain(|k, entry| {
            let alive = entry.created_at.elapsed() <= ttl;
            if !alive {
                evicted.push(k.clone());
            }
            alive
        });
        for key in &evicted {
            on_evict(key);
        }
        evicted.len()
    }

    /// Number of entries currently stored (including any not-yet-swept
    /// expired ones).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Snapshot of all non-expired keys.
    pub fn keys(&self) -> Vec<K> {
        let ttl = self.ttl;
        self.map
            .iter()
            .filter(|e| e.created_at.elapsed() <= ttl)
            .map(|e| e.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn insert_then_get_round_trips() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(10));
        cache.insert("a".to_string(), 1);
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(!cache.contains_key(&"a".to_string()));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(10));
        cache.insert("stale".to_string(), 1);
        sleep(Duration::from_millis(30));
        cache.insert("fresh".to_string(), 2);
        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert_eq!(cache.get(&"fresh".to_string()), Some(2));
    }
}
