//! Bounded recency cache for query results
//!
//! A single mutex guards the LRU map. Entries are pure functions of the
//! loaded artifacts, so a miss can always be recomputed and eviction never
//! changes an answer.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

/// Fixed-capacity LRU cache safe to share between threads
pub struct QueryCache<K, V> {
    entries: Mutex<LruCache<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> QueryCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a key, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.entries.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn put(&self, key: K, value: V) {
        self.entries.lock().put(key, value);
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// The lock is not held while `compute` runs; two callers racing on the
    /// same key both compute, and the results are identical.
    pub fn get_or_try_insert<E>(&self, key: K, compute: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: entries.len(),
            capacity: entries.cap().get(),
        }
    }

    /// Drop every entry and zero the counters, returning the stats from
    /// just before the reset
    pub fn clear(&self) -> CacheStats {
        let mut entries = self.entries.lock();
        let previous = CacheStats {
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            size: entries.len(),
            capacity: entries.cap().get(),
        };
        entries.clear();
        previous
    }
}
