//! The local, per-process LRU cache tier sitting between the write buffer
//! and the KV engine (spec.md §4.4). Values promoted here are durable
//! enough to read and write without going back to the KV engine, but are
//! still only a cache: losing this tier loses nothing that isn't also in
//! the KV engine (or still staged in the write buffer).

use bytes::Bytes;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Read and write access to a cached object go through separate handles so
/// a commander's intent (read vs. mutate) is visible at the call site, even
/// though both currently resolve to the same backing cache (spec.md §4.4
/// "read/write split views").
pub struct LruTier<T> {
    cache: Mutex<LruCache<Bytes, T>>,
    access_counts: DashMap<Bytes, AtomicU32>,
    hot_key_threshold: u32,
}

impl<T: Clone> LruTier<T> {
    pub fn new(capacity: usize, hot_key_threshold: u32) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        LruTier {
            cache: Mutex::new(LruCache::new(capacity)),
            access_counts: DashMap::new(),
            hot_key_threshold,
        }
    }

    fn bump_access(&self, cache_key: &Bytes) {
        self.access_counts
            .entry(cache_key.clone())
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A key is "hot" once its observed access count within this cache's
    /// lifetime crosses `hot_key_threshold` (spec.md §4.4). This is a
    /// monotonic counter, not a sliding window; a deployment wanting decay
    /// would wrap this tier and reset counts on a timer.
    pub fn is_hot_key(&self, cache_key: &Bytes) -> bool {
        self.access_counts
            .get(cache_key)
            .map(|c| c.load(Ordering::Relaxed) >= self.hot_key_threshold)
            .unwrap_or(false)
    }

    /// Bumps the access counter without touching cache contents, so a key
    /// can cross `hot_key_threshold` from repeated tier misses, not only
    /// from cache hits (spec.md §4.6 step 5 "is_hot_key(key, cmd)" gate).
    pub fn record_access(&self, cache_key: &Bytes) {
        self.bump_access(cache_key);
    }

    pub fn get_for_read(&self, cache_key: &Bytes) -> Option<T> {
        self.bump_access(cache_key);
        let mut cache = self.cache.lock().unwrap();
        cache.get(cache_key).cloned()
    }

    /// Same lookup as `get_for_read`, kept distinct so call sites document
    /// whether a hit is about to be mutated in place.
    pub fn get_for_write(&self, cache_key: &Bytes) -> Option<T> {
        self.bump_access(cache_key);
        let mut cache = self.cache.lock().unwrap();
        cache.get(cache_key).cloned()
    }

    pub fn put_for_read(&self, cache_key: Bytes, value: T) {
        let mut cache = self.cache.lock().unwrap();
        cache.put(cache_key, value);
    }

    pub fn put_for_write(&self, cache_key: Bytes, value: T) {
        let mut cache = self.cache.lock().unwrap();
        cache.put(cache_key, value);
    }

    /// Mutate a resident value in place without a full fetch-clone-store
    /// round trip, returning `None` if it is not resident.
    pub fn with_for_write<R>(&self, cache_key: &Bytes, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.bump_access(cache_key);
        let mut cache = self.cache.lock().unwrap();
        cache.get_mut(cache_key).map(f)
    }

    pub fn remove(&self, cache_key: &Bytes) -> Option<T> {
        let mut cache = self.cache.lock().unwrap();
        cache.pop(cache_key)
    }

    pub fn contains(&self, cache_key: &Bytes) -> bool {
        self.cache.lock().unwrap().contains(cache_key)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn put_then_get_round_trips() {
        let tier: LruTier<i32> = LruTier::new(4, 3);
        tier.put_for_write(key("a"), 42);
        assert_eq!(tier.get_for_read(&key("a")), Some(42));
    }

    #[test]
    fn eviction_respects_capacity() {
        let tier: LruTier<i32> = LruTier::new(2, 100);
        tier.put_for_write(key("a"), 1);
        tier.put_for_write(key("b"), 2);
        tier.put_for_write(key("c"), 3);
        assert_eq!(tier.len(), 2);
        assert!(!tier.contains(&key("a")));
    }

    #[test]
    fn hot_key_crosses_threshold_after_enough_reads() {
        let tier: LruTier<i32> = LruTier::new(4, 3);
        tier.put_for_write(key("a"), 1);
        assert!(!tier.is_hot_key(&key("a")));
        tier.get_for_read(&key("a"));
        tier.get_for_read(&key("a"));
        assert!(tier.is_hot_key(&key("a")));
    }

    #[test]
    fn with_for_write_mutates_in_place() {
        let tier: LruTier<Vec<i32>> = LruTier::new(4, 100);
        tier.put_for_write(key("a"), vec![1, 2, 3]);
        tier.with_for_write(&key("a"), |v| v.push(4));
        assert_eq!(tier.get_for_read(&key("a")), Some(vec![1, 2, 3, 4]));
    }
}
