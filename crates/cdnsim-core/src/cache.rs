//! C2: per-VOD chunk cache. Wraps the LRU chunk store (C1) with hit/miss
//! accounting and in-flight origin-bandwidth tracking.
//!
//! Grounded on `original_source/lb/cache/cache.go`.

use crate::error::CacheError;
use crate::lru::LruStore;
use crate::types::ChunkEvent;

/// A single VOD's chunk cache: LRU-backed, byte-budgeted, with hit/miss and
/// origin-bandwidth counters.
#[derive(Default)]
pub struct Cache {
    lru: LruStore,
    pub limit_size: i64,
    pub cur_size: i64,
    pub hit_count: i64,
    pub miss_count: i64,
    pub origin_bps: i64,
    /// Set once any eviction has occurred; never cleared.
    pub is_cache_full: bool,
}

impl Cache {
    pub fn new(limit_size: i64) -> Self {
        Self {
            lru: LruStore::new(),
            limit_size,
            ..Default::default()
        }
    }

    /// Admits `size` bytes under `key`, evicting least-recently-used entries
    /// until it fits. Fails if `size` alone exceeds `limit_size`.
    fn add(&mut self, key: crate::types::ChunkKey, size: i64) -> Result<(), CacheError> {
        if self.limit_size <= 0 || self.limit_size < size {
            return Err(CacheError::ChunkTooLarge {
                size,
                limit: self.limit_size,
            });
        }
        while self.cur_size + size > self.limit_size {
            match self.lru.remove_oldest() {
                Some((_, evicted_size)) => {
                    self.cur_size -= evicted_size;
                    self.is_cache_full = true;
                }
                None => break,
            }
        }
        self.lru.add(key, size);
        self.cur_size += size;
        Ok(())
    }

    /// Processes a chunk-start event. Returns whether this chunk is being
    /// served from origin (`true` on miss/bypass, `false` on hit).
    pub fn start_chunk(&mut self, evt: &ChunkEvent) -> Result<bool, CacheError> {
        if evt.bypass {
            self.miss_count += 1;
            self.origin_bps += evt.bps;
            return Ok(false);
        }

        let key = evt.key();
        match self.lru.get(&key) {
            Some(cached) => {
                if cached != evt.chunk_size {
                    return Err(CacheError::InvalidChunkSize {
                        key,
                        cached,
                        expected: evt.chunk_size,
                    });
                }
                self.hit_count += 1;
                Ok(false)
            }
            None => {
                self.add(key, evt.chunk_size)?;
                self.miss_count += 1;
                self.origin_bps += evt.bps;
                Ok(true)
            }
        }
    }

    /// Processes a chunk-end event. `use_origin` is whatever `start_chunk`
    /// returned for the matching start (bypass chunks also pass `true`).
    pub fn end_chunk(&mut self, evt: &ChunkEvent, use_origin: bool) {
        if use_origin || evt.bypass {
            self.origin_bps -= evt.bps;
        }
    }
}
