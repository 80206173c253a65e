mod tile_cache;

pub use tile_cache::{CacheStats, CachedTile, TileCache, TileKey, DEFAULT_CAPACITY};

use std::sync::OnceLock;

static GLOBAL: OnceLock<TileCache> = OnceLock::new();

/// The process-wide tile cache, lazily created with [`DEFAULT_CAPACITY`] on
/// first access. Call sites that need a non-default capacity should build
/// their own [`TileCache`] instead of using this handle.
pub fn global() -> &'static TileCache {
    global_with_config(crate::config::CacheConfig::default())
}

/// Like [`global`], but sizes the cache per `config` on first initialization.
/// Since the global cache is a singleton, a call after some other call site
/// already triggered [`global`]/[`global_with_config`] has no effect on
/// capacity — build a private [`TileCache`] instead if that matters.
pub fn global_with_config(config: crate::config::CacheConfig) -> &'static TileCache {
    GLOBAL.get_or_init(|| TileCache::new(config.capacity).expect("CacheConfig::capacity is nonzero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_cache_is_reachable() {
        let key = TileKey::new("s", 0, 0, 0);
        assert!(global().get(&key).is_none());
    }
}
