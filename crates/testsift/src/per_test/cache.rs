//! Byte-bounded LRU cache for per-test coverage bitsets.
//!
//! The lock is held across the loader so that two readers missing on the
//! same key never load it twice. Loads are single file reads, so the
//! critical section stays short.

use crate::coverage::CoverageBitSet;
use crate::result::SiftResult;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Values that know their approximate in-memory size
pub trait CacheWeight {
    /// Approximate heap footprint in bytes
    fn weight(&self) -> usize;
}

impl CacheWeight for CoverageBitSet {
    fn weight(&self) -> usize {
        self.size_in_bytes()
    }
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from memory
    pub hits: u64,
    /// Lookups that ran the loader
    pub misses: u64,
    /// Entries dropped to stay under capacity
    pub evictions: u64,
}

struct Entry<V> {
    value: Arc<V>,
    weight: usize,
    last_used: u64,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Recency order: tick of last use -> key, oldest first
    recency: BTreeMap<u64, K>,
    tick: u64,
    bytes: usize,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> State<K, V> {
    fn touch(&mut self, key: &K) -> Option<Arc<V>> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = tick;
        self.recency.insert(tick, key.clone());
        Some(Arc::clone(&entry.value))
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.bytes > capacity {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.bytes -= entry.weight;
                self.stats.evictions += 1;
            }
        }
    }
}

/// LRU cache bounded by the total weight of its values
pub struct SizedLruCache<K, V> {
    capacity_bytes: usize,
    state: Mutex<State<K, V>>,
}

impl<K, V> fmt::Debug for SizedLruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizedLruCache")
            .field("capacity_bytes", &self.capacity_bytes)
            .finish_non_exhaustive()
    }
}

impl<K, V> SizedLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: CacheWeight,
{
    /// Create a cache holding at most `capacity_bytes` of values
    ///
    /// `expected_entries` only pre-sizes the key table.
    #[must_use]
    pub fn new(capacity_bytes: usize, expected_entries: usize) -> Self {
        Self {
            capacity_bytes,
            state: Mutex::new(State {
                entries: HashMap::with_capacity(expected_entries),
                recency: BTreeMap::new(),
                tick: 0,
                bytes: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Capacity in bytes
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Bytes currently held
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.state.lock().bytes
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss/eviction counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    /// Cached value for `key`, if present; marks it most recently used
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.state.lock().touch(key)
    }

    /// Return the cached value for `key`, loading and inserting it on a miss
    ///
    /// Lookup, load and insert form one critical section. A failed load
    /// caches nothing. A value heavier than the whole capacity is returned
    /// but not retained.
    pub fn get_or_insert_with<F>(&self, key: &K, loader: F) -> SiftResult<Arc<V>>
    where
        F: FnOnce() -> SiftResult<V>,
    {
        let mut state = self.state.lock();
        if let Some(value) = state.touch(key) {
            state.stats.hits += 1;
            return Ok(value);
        }
        state.stats.misses += 1;

        let value = Arc::new(loader()?);
        let weight = value.weight();
        if weight > self.capacity_bytes {
            return Ok(value);
        }

        state.tick += 1;
        let tick = state.tick;
        state.recency.insert(tick, key.clone());
        state.bytes += weight;
        state.entries.insert(
            key.clone(),
            Entry {
                value: Arc::clone(&value),
                weight,
                last_used: tick,
            },
        );
        state.evict_to(self.capacity_bytes);
        Ok(value)
    }

    /// Drop `key` from the cache
    pub fn invalidate(&self, key: &K) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.remove(key) {
            state.recency.remove(&entry.last_used);
            state.bytes -= entry.weight;
        }
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
        state.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::SiftError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Blob(usize);

    impl CacheWeight for Blob {
        fn weight(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_hit_after_miss() {
        let cache = SizedLruCache::new(100, 4);
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Blob(10))
        };
        assert_eq!(*cache.get_or_insert_with(&"a", load).unwrap(), Blob(10));
        assert_eq!(*cache.get_or_insert_with(&"a", load).unwrap(), Blob(10));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = SizedLruCache::new(30, 4);
        cache.get_or_insert_with(&"a", || Ok(Blob(10))).unwrap();
        cache.get_or_insert_with(&"b", || Ok(Blob(10))).unwrap();
        cache.get_or_insert_with(&"c", || Ok(Blob(10))).unwrap();
        // refresh "a" so "b" becomes the eldest
        assert!(cache.get(&"a").is_some());
        cache.get_or_insert_with(&"d", || Ok(Blob(10))).unwrap();
        assert!(cache.get(&"b").is_none());
        assert!(cache.get(&"a").is_some());
        assert_eq!(cache.used_bytes(), 30);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_value_not_retained() {
        let cache = SizedLruCache::new(5, 1);
        let v = cache.get_or_insert_with(&1, || Ok(Blob(50))).unwrap();
        assert_eq!(*v, Blob(50));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_load_caches_nothing() {
        let cache: SizedLruCache<&str, Blob> = SizedLruCache::new(100, 1);
        let err = cache.get_or_insert_with(&"x", || {
            Err(SiftError::Truncated { context: "test" })
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_insert_with(&"x", || Ok(Blob(1))).unwrap(), Blob(1));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = SizedLruCache::new(100, 2);
        cache.get_or_insert_with(&1, || Ok(Blob(7))).unwrap();
        cache.get_or_insert_with(&2, || Ok(Blob(8))).unwrap();
        cache.invalidate(&1);
        assert_eq!(cache.used_bytes(), 8);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn test_concurrent_misses_load_once() {
        let cache = Arc::new(SizedLruCache::new(1_000, 1));
        let loads = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                std::thread::spawn(move || {
                    cache
                        .get_or_insert_with(&"shared", || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(Blob(3))
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(*handle.join().unwrap(), Blob(3));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
