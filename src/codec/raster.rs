//! Compressed-bytes-to-dense-RGB8 decoding, shared by every format plugin.
//!
//! TIFF tiles carry raw or JPEG-compressed pixels; MRXS stored images are
//! JPEG, PNG, or BMP depending on scanner vendor. Every decode path funnels
//! through [`decode_to_rgb8`] so the rest of the crate only ever deals with
//! one pixel representation.

use image::{ImageFormat, RgbImage};

use crate::error::{Error, ErrorKind, Result};

/// A decoded tile or stored image: dense, row-major RGB8.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: RgbImage,
}

pub enum SourceFormat {
    Jpeg,
    Png,
    Bmp,
}

pub fn decode_to_rgb8(data: &[u8], format: SourceFormat) -> Result<DecodedImage> {
    let fmt = match format {
        SourceFormat::Jpeg => ImageFormat::Jpeg,
        SourceFormat::Png => ImageFormat::Png,
        SourceFormat::Bmp => ImageFormat::Bmp,
    };
    let decoded = image::load_from_memory_with_format(data, fmt)
        .map_err(|e| Error::new(ErrorKind::Internal, format!("image decode failed: {e}")))?;
    let rgb = decoded.to_rgb8();
    Ok(DecodedImage {
        width: rgb.width(),
        height: rgb.height(),
        pixels: rgb,
    })
}

/// Sniffs a stored-image format from its magic bytes, used by the MRXS
/// plugin where the index only records an offset/length, not a type.
pub fn sniff_format(data: &[u8]) -> Option<SourceFormat> {
    if data.len() < 8 {
        return None;
    }
    if data[0..2] == [0xFF, 0xD8] {
        Some(SourceFormat::Jpeg)
    } else if data[0..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
        Some(SourceFormat::Png)
    } else if data[0..2] == [b'B', b'M'] {
        Some(SourceFormat::Bmp)
    } else {
        None
    }
}
