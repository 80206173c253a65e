//! Incremental SHA-256 fingerprint builder.
//!
//! Mirrors the original `QuickHashBuilder`: bytes can be fed in piecemeal via
//! [`QuickHashBuilder::hash_data`], a whole file, or a byte range of a file,
//! and [`QuickHashBuilder::finalize`] is idempotent — calling it twice
//! returns the digest the first time and an empty string the second,
//! rather than re-hashing or panicking. Accumulating after finalize is a
//! `FailedPrecondition`, not a panic: callers that forget to check can keep
//! going, they just stop getting new bytes mixed in.

use sha2::{Digest, Sha256};

use crate::error::{Error, ErrorKind, Result};
use crate::io::file_source::RangeSource;

pub struct QuickHashBuilder {
    hasher: Option<Sha256>,
    finalized_digest: Option<String>,
}

impl Default for QuickHashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QuickHashBuilder {
    pub fn new() -> Self {
        QuickHashBuilder {
            hasher: Some(Sha256::new()),
            finalized_digest: None,
        }
    }

    fn hasher_mut(&mut self) -> Result<&mut Sha256> {
        self.hasher.as_mut().ok_or_else(|| {
            Error::new(
                ErrorKind::FailedPrecondition,
                "cannot accumulate into a finalized QuickHashBuilder",
            )
        })
    }

    pub fn hash_data(&mut self, data: &[u8]) -> Result<()> {
        self.hasher_mut()?.update(data);
        Ok(())
    }

    pub fn hash_file(&mut self, source: &dyn RangeSource) -> Result<()> {
        self.hash_file_part(source, 0, source.size())
    }

    pub fn hash_file_part(&mut self, source: &dyn RangeSource, offset: u64, len: u64) -> Result<()> {
        const CHUNK: u64 = 4 << 20;
        let mut remaining = len;
        let mut pos = offset;
        while remaining > 0 {
            let take = remaining.min(CHUNK);
            let bytes = source.read_exact_at(pos, take)?;
            self.hasher_mut()?.update(&bytes);
            pos += take;
            remaining -= take;
        }
        Ok(())
    }

    /// Returns the hex digest the first time this is called; an empty string
    /// on every call after that, without touching the accumulator again.
    pub fn finalize(&mut self) -> String {
        if let Some(digest) = &self.finalized_digest {
            return digest.clone();
        }
        let Some(hasher) = self.hasher.take() else {
            return String::new();
        };
        let digest = format!("{:x}", hasher.finalize());
        self.finalized_digest = Some(digest.clone());
        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_plain_bytes_deterministically() {
        let mut a = QuickHashBuilder::new();
        a.hash_data(b"hello").unwrap();
        let digest_a = a.finalize();

        let mut b = QuickHashBuilder::new();
        b.hash_data(b"hel").unwrap();
        b.hash_data(b"lo").unwrap();
        let digest_b = b.finalize();

        assert_eq!(digest_a, digest_b);
        assert_eq!(digest_a.len(), 64);
    }

    #[test]
    fn double_finalize_is_idempotent_but_empty_second_time() {
        let mut b = QuickHashBuilder::new();
        b.hash_data(b"hello").unwrap();
        let first = b.finalize();
        let second = b.finalize();
        assert!(!first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn accumulate_after_finalize_errors() {
        let mut b = QuickHashBuilder::new();
        b.finalize();
        let err = b.hash_data(b"too late").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    }
}
