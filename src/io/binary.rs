//! Endian-aware scalar reads out of in-memory byte slices.
//!
//! File formats this crate parses mix byte orders (TIFF's `II`/`MM` header
//! selects little- or big-endian for the rest of the file; the MRXS index is
//! always little-endian), so every size gets both a `_le` and `_be` reader
//! rather than picking one at compile time.

use crate::error::{IoError, Result};

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        return Err(IoError::Read {
            path: String::new(),
            message: format!("need {n} bytes, have {}", buf.len()),
        }
        .into());
    }
    Ok(())
}

pub fn read_u16_le(buf: &[u8]) -> Result<u16> {
    need(buf, 2)?;
    Ok(u16::from_le_bytes([buf[0], buf[1]]))
}

pub fn read_u16_be(buf: &[u8]) -> Result<u16> {
    need(buf, 2)?;
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

pub fn read_u32_le(buf: &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

pub fn read_u32_be(buf: &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

pub fn read_u64_le(buf: &[u8]) -> Result<u64> {
    need(buf, 8)?;
    let mut a = [0u8; 8];
    a.copy_from_slice(&buf[..8]);
    Ok(u64::from_le_bytes(a))
}

pub fn read_u64_be(buf: &[u8]) -> Result<u64> {
    need(buf, 8)?;
    let mut a = [0u8; 8];
    a.copy_from_slice(&buf[..8]);
    Ok(u64::from_be_bytes(a))
}

pub fn read_i32_le(buf: &[u8]) -> Result<i32> {
    Ok(read_u32_le(buf)? as i32)
}
