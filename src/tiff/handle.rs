//! Pooled file access for a single open TIFF/SVS file.
//!
//! A `TiffHandle` hands out [`RangeSource`] reads backed by a small
//! [`HandlePool`] of [`FileSource`]s rather than a single shared file
//! object, so concurrent tile fetches on the same slide don't serialize
//! behind one file's read cursor on platforms without `pread`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::io::{FileSource, RangeSource};
use crate::pool::HandlePool;

pub struct TiffHandle {
    pool: HandlePool<FileSource>,
    size: u64,
    identifier: String,
}

impl TiffHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    pub fn open_with_capacity(path: impl AsRef<Path>, max_handles: usize) -> Result<Self> {
        Self::open_with_config(path, PoolConfig { max_handles, ..PoolConfig::default() })
    }

    /// Opens a file handle backed by a pool sized per `pool`.
    pub fn open_with_config(path: impl AsRef<Path>, pool: PoolConfig) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let probe = FileSource::open(&path)?;
        let size = probe.size();
        let identifier = probe.identifier().to_string();

        let pool_path = Arc::new(path);
        let factory_path = Arc::clone(&pool_path);
        let handle_pool = HandlePool::new(pool.max_handles, move || FileSource::open(factory_path.as_path()));

        Ok(TiffHandle { pool: handle_pool, size, identifier })
    }
}

impl RangeSource for TiffHandle {
    fn read_exact_at(&self, offset: u64, len: u64) -> Result<bytes::Bytes> {
        let guard = self.pool.acquire()?;
        guard.read_exact_at(offset, len)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    struct TempFile {
        path: PathBuf,
    }
    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn write_temp(data: &[u8]) -> TempFile {
        let mut path = std::env::temp_dir();
        path.push(format!("wsi-reader-handle-test-{:p}", &path as *const _));
        let mut file = File::create(&path).unwrap();
        file.write_all(data).unwrap();
        TempFile { path }
    }

    #[test]
    fn reads_through_pooled_handles() {
        let tmp = write_temp(b"hello pooled world");
        let handle = TiffHandle::open_with_capacity(&tmp.path, 2).unwrap();
        assert_eq!(handle.size(), 18);
        let bytes = handle.read_exact_at(6, 6).unwrap();
        assert_eq!(&bytes[..], b"pooled");
    }

    #[test]
    fn concurrent_reads_reuse_bounded_handles() {
        let tmp = write_temp(&vec![0xAB; 4096]);
        let handle = Arc::new(TiffHandle::open_with_capacity(&tmp.path, 2).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || {
                    let bytes = handle.read_exact_at(0, 16).unwrap();
                    assert_eq!(bytes.len(), 16);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(handle.pool.created() <= 2);
    }
}
