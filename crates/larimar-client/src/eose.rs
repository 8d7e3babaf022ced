//! EOSE high-water-mark cache.
//!
//! For each logical subscription key this tracks, per relay, the latest
//! point up to which that relay has confirmed "no more stored events". The
//! orchestration layer turns these into `since` filters so a
//! re-subscription never re-requests history it already has.
//!
//! Marks are monotonic per (key, relay): a new mark only replaces the old
//! one if it is greater. Capacity is bounded LRU because keys proliferate
//! with usage (one per thread ever viewed); eviction is safe: a missing
//! entry just causes a full resync for that key.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use larimar_core::relay_url::NormalizedRelayUrl;

/// Configuration for the EOSE cache.
#[derive(Debug, Clone)]
pub struct EoseCacheConfig {
    /// Maximum number of keys tracked.
    pub capacity: usize,
}

impl Default for EoseCacheConfig {
    fn default() -> Self {
        Self { capacity: 512 }
    }
}

/// Per-key, per-relay monotonic sync checkpoints.
pub struct EoseCache<K: Hash + Eq> {
    inner: Mutex<LruCache<K, HashMap<NormalizedRelayUrl, u64>>>,
}

impl<K: Hash + Eq + Clone> EoseCache<K> {
    pub fn new(config: EoseCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).expect("capacity is non-zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The per-relay checkpoint map for a key, or `None` if never seen
    /// (or evicted, in which case the caller performs a full resync).
    pub fn since(&self, key: &K) -> Option<HashMap<NormalizedRelayUrl, u64>> {
        self.inner.lock().get(key).cloned()
    }

    /// Record a checkpoint with MAX semantics: never regresses.
    pub fn new_eose(&self, key: &K, relay: &NormalizedRelayUrl, time: u64) {
        let mut inner = self.inner.lock();
        let map = inner.get_or_insert_mut(key.clone(), HashMap::new);
        let slot = map.entry(relay.clone()).or_insert(time);
        if time > *slot {
            *slot = time;
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<K: Hash + Eq + Clone> Default for EoseCache<K> {
    fn default() -> Self {
        Self::new(EoseCacheConfig::default())
    }
}
