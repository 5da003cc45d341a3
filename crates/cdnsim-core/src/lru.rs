//! C1: fixed-capacity LRU chunk store.
//!
//! Grounded on `original_source/cache/lru.go`'s `Lru` (doubly-linked list +
//! hash map, `OnEvicted` callback fired once per evicted entry). Reuses the
//! `lru` crate's `LruCache` for the list+map bookkeeping rather than
//! hand-rolling an intrusive list.

use lru::LruCache;

use crate::types::ChunkKey;

/// Strict least-recently-used store of chunk sizes, unbounded by entry
/// count (eviction here is driven by the wrapping cache's byte budget, not
/// by a fixed number of entries — see `cache.rs`).
pub struct LruStore {
    inner: LruCache<ChunkKey, i64>,
}

impl LruStore {
    pub fn new() -> Self {
        Self {
            // The wrapping cache enforces the byte budget; this inner store
            // never needs to refuse an insert on its own, so it is sized
            // generously and never grows the index past what `Add` puts in.
            inner: LruCache::unbounded(),
        }
    }

    /// Inserts or updates `key`, moving it to most-recently-used.
    pub fn add(&mut self, key: ChunkKey, size: i64) {
        self.inner.put(key, size);
    }

    /// Looks up `key`, moving it to most-recently-used on hit.
    pub fn get(&mut self, key: &ChunkKey) -> Option<i64> {
        self.inner.get(key).copied()
    }

    pub fn remove(&mut self, key: &ChunkKey) -> bool {
        self.inner.pop(key).is_some()
    }

    /// Evicts the least-recently-used entry and returns it, if any.
    pub fn remove_oldest(&mut self) -> Option<(ChunkKey, i64)> {
        self.inner.pop_lru()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for LruStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_promotes_to_most_recently_used() {
        let mut s = LruStore::new();
        s.add(ChunkKey::new(1, 0), 10);
        s.add(ChunkKey::new(1, 1), 10);
        // Touch key 0 so key 1 becomes the oldest.
        assert_eq!(s.get(&ChunkKey::new(1, 0)), Some(10));
        let (evicted, _) = s.remove_oldest().unwrap();
        assert_eq!(evicted, ChunkKey::new(1, 1));
    }

    #[test]
    fn re_adding_a_key_updates_value_without_growing_length() {
        let mut s = LruStore::new();
        s.add(ChunkKey::new(1, 0), 10);
        s.add(ChunkKey::new(1, 0), 20);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(&ChunkKey::new(1, 0)), Some(20));
    }

    #[test]
    fn remove_oldest_on_empty_store_is_a_no_op() {
        let mut s = LruStore::new();
        assert!(s.remove_oldest().is_none());
    }
}
