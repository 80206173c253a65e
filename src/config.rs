//! Tunables for the cache, handle pool, and tile executor.
//!
//! There is no CLI or environment-variable surface here — this crate is a
//! library, not a service, so configuration is just plain structs with
//! sensible `Default`s that callers construct and pass in directly.

use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;

/// Tile cache sizing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum number of decoded tiles kept in memory.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// File handle pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum number of concurrently open file handles per slide.
    pub max_handles: usize,
    /// How long `acquire` blocks before giving up.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_handles: 8,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Tile execution parallelism.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Worker threads used to fetch and decode tiles in parallel.
    /// `0` means use the rayon default (the number of logical CPUs).
    pub worker_threads: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { worker_threads: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_nonzero_where_required() {
        assert!(CacheConfig::default().capacity > 0);
        assert!(PoolConfig::default().max_handles > 0);
    }
}
