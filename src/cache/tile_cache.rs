//! Entry-count-bounded LRU cache for decoded tiles.
//!
//! Unlike the byte-size-based cache this module is descended from, capacity
//! here is a plain entry count: a tile pyramid's tiles are roughly uniform in
//! decoded size, so counting entries is simpler to reason about and to
//! resize than tracking aggregate bytes.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::codec::DecodedImage;
use crate::error::{CacheError, Result};

pub const DEFAULT_CAPACITY: usize = 512;

/// Identifies one decoded tile: which file, which pyramid level, which grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub file_id: Arc<str>,
    pub level: u32,
    pub tile_x: u32,
    pub tile_y: u32,
}

impl TileKey {
    pub fn new(file_id: impl Into<Arc<str>>, level: u32, tile_x: u32, tile_y: u32) -> Self {
        TileKey {
            file_id: file_id.into(),
            level,
            tile_x,
            tile_y,
        }
    }
}

pub type CachedTile = Arc<DecodedImage>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
    pub memory_bytes: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU cache of decoded tiles, keyed by [`TileKey`].
pub struct TileCache {
    inner: Mutex<LruCache<TileKey, CachedTile>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        Ok(TileCache {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn get(&self, key: &TileKey) -> Option<CachedTile> {
        let mut inner = self.inner.lock();
        let found = inner.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put(&self, key: TileKey, tile: CachedTile) {
        self.inner.lock().put(key, tile);
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Resizes the cache, dropping all entries regardless of the new capacity.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        let mut inner = self.inner.lock();
        inner.clear();
        inner.resize(capacity);
        Ok(())
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let memory_bytes = inner.iter().map(|(_, tile)| tile_bytes(tile)).sum();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            capacity: inner.cap().get(),
            size: inner.len(),
            memory_bytes,
        }
    }
}

fn tile_bytes(tile: &CachedTile) -> u64 {
    tile.width as u64 * tile.height as u64 * 3
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY).expect("DEFAULT_CAPACITY is nonzero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn tile() -> CachedTile {
        Arc::new(DecodedImage {
            width: 1,
            height: 1,
            pixels: RgbImage::new(1, 1),
        })
    }

    #[test]
    fn get_put_round_trip() {
        let cache = TileCache::new(4).unwrap();
        let key = TileKey::new("slide.svs", 0, 1, 2);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), tile());
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn tracks_hit_miss_stats() {
        let cache = TileCache::new(4).unwrap();
        let key = TileKey::new("slide.svs", 0, 0, 0);
        cache.get(&key);
        cache.put(key.clone(), tile());
        cache.get(&key);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn evicts_lru_entry_past_capacity() {
        let cache = TileCache::new(2).unwrap();
        let a = TileKey::new("s", 0, 0, 0);
        let b = TileKey::new("s", 0, 1, 0);
        let c = TileKey::new("s", 0, 2, 0);
        cache.put(a.clone(), tile());
        cache.put(b.clone(), tile());
        cache.put(c.clone(), tile());
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(TileCache::new(0).is_err());
    }

    #[test]
    fn set_capacity_drops_all_entries() {
        let cache = TileCache::new(4).unwrap();
        cache.put(TileKey::new("s", 0, 0, 0), tile());
        cache.set_capacity(8).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_report_capacity_size_and_memory() {
        let cache = TileCache::new(4).unwrap();
        cache.put(TileKey::new("s", 0, 0, 0), tile());
        cache.put(TileKey::new("s", 0, 1, 0), tile());
        let stats = cache.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.memory_bytes, 2 * 1 * 1 * 3);
    }
}
