//! Local random-access file I/O: the one concrete backend this crate ships.
//!
//! No network or object-store backend is in scope; every reader plugin
//! ultimately pulls bytes through [`RangeSource`], implemented here against
//! a plain [`std::fs::File`]. On unix this uses `read_at`, which needs no
//! seek lock and composes cleanly with parallel tile fetches; non-unix
//! platforms fall back to a mutex-guarded seek+read.

use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Context, IoError, Result};

/// A byte range a reader plugin can pull from, independent of backing store.
pub trait RangeSource: Send + Sync {
    fn read_exact_at(&self, offset: u64, len: u64) -> Result<Bytes>;
    fn size(&self) -> u64;
    fn identifier(&self) -> &str;
}

/// A single local file opened for random-access reads.
pub struct FileSource {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: Mutex<File>,
    size: u64,
    path: String,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let path_str = path.to_string_lossy().into_owned();
        let file = File::open(&path).map_err(|e| IoError::Open {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        let size = file
            .metadata()
            .map_err(|e| IoError::Open {
                path: path_str.clone(),
                message: e.to_string(),
            })?
            .len();
        Ok(FileSource {
            #[cfg(unix)]
            file,
            #[cfg(not(unix))]
            file: Mutex::new(file),
            size,
            path: path_str,
        })
    }
}

impl RangeSource for FileSource {
    fn read_exact_at(&self, offset: u64, len: u64) -> Result<Bytes> {
        if offset.saturating_add(len) > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len,
                size: self.size,
            }
            .into());
        }
        let mut buf = vec![0u8; len as usize];

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file
                .read_exact_at(&mut buf, offset)
                .map_err(|e| IoError::Read {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
                .context("reading file range")?;
        }
        #[cfg(not(unix))]
        {
            use std::io::{Seek, SeekFrom};
            let mut guard = self.file.lock().expect("file mutex poisoned");
            guard
                .seek(SeekFrom::Start(offset))
                .and_then(|_| guard.read_exact(&mut buf))
                .map_err(|e| IoError::Read {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
                .context("reading file range")?;
        }

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.path
    }
}

/// Reads an entire small file into memory, for `Slidedat.ini` and similar.
pub fn read_to_vec(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path_str = path.as_ref().to_string_lossy().into_owned();
    let mut file = File::open(&path).map_err(|e| IoError::Open {
        path: path_str.clone(),
        message: e.to_string(),
    })?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(|e| IoError::Read {
        path: path_str,
        message: e.to_string(),
    })?;
    Ok(buf)
}
