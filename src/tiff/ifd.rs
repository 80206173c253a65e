//! IFD (Image File Directory) parsing.
//!
//! An IFD is a sequence of fixed-size entries, each describing one tagged
//! value, preceded by an entry count and followed by the offset of the next
//! IFD in the chain (0 if this is the last one). Values that fit in the
//! entry's value/offset field are stored inline; larger values (arrays,
//! strings) store a file offset there instead, resolved later by
//! [`super::values::ValueReader`].

use crate::error::{Result, TiffError};

use super::header::{ByteOrder, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// One parsed IFD entry: a tag, its field type, element count, and the raw
/// value/offset bytes exactly as they appeared in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag_id: u16,
    pub field_type_raw: u16,
    pub field_type: Option<FieldType>,
    pub count: u64,
    /// The entry's value/offset field, verbatim: 4 bytes for classic TIFF,
    /// 8 for BigTIFF. Interpretation (inline value vs. file offset) depends
    /// on `is_inline`.
    pub value_offset_bytes: Vec<u8>,
    pub is_inline: bool,
}

impl IfdEntry {
    /// Total byte size of the value this entry describes, if the field type
    /// is recognized.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type.map(|t| t.size_in_bytes() as u64 * self.count)
    }

    /// Reads the inline value as a u32, for single-valued Short/Long entries
    /// stored inline. Returns `None` if the entry is not inline or not a
    /// single scalar of a compatible type.
    pub fn inline_u32(&self, byte_order: ByteOrder) -> Option<u32> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type {
            Some(FieldType::Short) => Some(byte_order.read_u16(&self.value_offset_bytes[0..2]) as u32),
            Some(FieldType::Long) => Some(byte_order.read_u32(&self.value_offset_bytes[0..4])),
            _ => None,
        }
    }

    /// Reads the inline value as a u64, for single-valued Long8 entries
    /// stored inline (BigTIFF only).
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type {
            Some(FieldType::Long8) if self.value_offset_bytes.len() >= 8 => {
                Some(byte_order.read_u64(&self.value_offset_bytes[0..8]))
            }
            Some(FieldType::Long) => Some(byte_order.read_u32(&self.value_offset_bytes[0..4]) as u64),
            _ => self.inline_u32(byte_order).map(u64::from),
        }
    }

    /// Interprets the value/offset field as a file offset, for non-inline
    /// entries whose value lives elsewhere in the file.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes[0..8])
        } else {
            byte_order.read_u32(&self.value_offset_bytes[0..4]) as u64
        }
    }
}

/// A parsed Image File Directory: its entries plus the offset of the next
/// IFD in the chain (0 terminates the chain).
#[derive(Debug, Clone)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// An IFD with no entries, terminating the chain. Useful as a test fixture.
    pub fn empty() -> Self {
        Ifd {
            entries: Vec::new(),
            next_ifd_offset: 0,
        }
    }

    /// Total byte length of an IFD with `entry_count` entries, including the
    /// leading count field and trailing next-offset field.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> u64 {
        header.ifd_count_size() as u64
            + entry_count * header.ifd_entry_size() as u64
            + header.ifd_next_offset_size() as u64
    }

    /// Parses a complete IFD (count field, entries, next-offset field) from
    /// `bytes`, which must be at least [`Ifd::calculate_size`] bytes long for
    /// the entry count it itself declares.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self> {
        let byte_order = header.byte_order;
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            }
            .into());
        }

        let entry_count = if header.is_bigtiff {
            byte_order.read_u64(&bytes[0..count_size])
        } else {
            byte_order.read_u16(&bytes[0..count_size]) as u64
        };

        let entry_size = header.ifd_entry_size();
        let next_offset_size = header.ifd_next_offset_size();
        let required = Self::calculate_size(entry_count, header);
        if (bytes.len() as u64) < required {
            return Err(TiffError::FileTooSmall {
                required,
                actual: bytes.len() as u64,
            }
            .into());
        }

        let value_field_size = header.value_offset_size();
        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut cursor = count_size;
        for _ in 0..entry_count {
            let entry_bytes = &bytes[cursor..cursor + entry_size];
            let tag_id = byte_order.read_u16(&entry_bytes[0..2]);
            let field_type_raw = byte_order.read_u16(&entry_bytes[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);

            let (count, value_offset_bytes) = if header.is_bigtiff {
                let count = byte_order.read_u64(&entry_bytes[4..12]);
                (count, entry_bytes[12..20].to_vec())
            } else {
                let count = byte_order.read_u32(&entry_bytes[4..8]) as u64;
                (count, entry_bytes[8..12].to_vec())
            };

            let is_inline = match field_type {
                Some(t) => t.fits_inline(count, header.is_bigtiff),
                None => false,
            };

            entries.push(IfdEntry {
                tag_id,
                field_type_raw,
                field_type,
                count,
                value_offset_bytes,
                is_inline,
            });

            cursor += entry_size;
        }

        let next_ifd_offset = if header.is_bigtiff {
            byte_order.read_u64(&bytes[cursor..cursor + next_offset_size])
        } else {
            byte_order.read_u32(&bytes[cursor..cursor + next_offset_size]) as u64
        };

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    pub fn get_entry_by_tag(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag_id == tag.as_u16())
    }

    pub fn tile_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(TiffTag::TileWidth)?.inline_u32(byte_order)
    }

    pub fn tile_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(TiffTag::TileLength)?.inline_u32(byte_order)
    }

    pub fn image_width(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(TiffTag::ImageWidth)?.inline_u32(byte_order)
    }

    pub fn image_height(&self, byte_order: ByteOrder) -> Option<u32> {
        self.get_entry_by_tag(TiffTag::ImageLength)?.inline_u32(byte_order)
    }

    pub fn compression(&self, byte_order: ByteOrder) -> Option<u16> {
        self.get_entry_by_tag(TiffTag::Compression)?
            .inline_u32(byte_order)
            .map(|v| v as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    fn push_entry(buf: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: [u8; 4]) {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&field_type.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&value);
    }

    #[test]
    fn parses_inline_short_and_long_entries() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u16.to_le_bytes()); // entry count
        push_entry(&mut buf, 256, 3, 1, [0x00, 0x04, 0x00, 0x00]); // ImageWidth=1024, SHORT
        push_entry(&mut buf, 257, 4, 1, [0x00, 0x02, 0x00, 0x00]); // ImageLength=512, LONG
        buf.extend_from_slice(&0u32.to_le_bytes()); // next IFD offset

        let h = header();
        let ifd = Ifd::parse(&buf, &h).unwrap();
        assert_eq!(ifd.entries.len(), 2);
        assert_eq!(ifd.next_ifd_offset, 0);
        assert_eq!(ifd.image_width(h.byte_order), Some(1024));
        assert_eq!(ifd.image_height(h.byte_order), Some(512));
    }

    #[test]
    fn calculate_size_matches_classic_tiff_layout() {
        let h = header();
        // count(2) + 3*entry(12) + next(4) = 42
        assert_eq!(Ifd::calculate_size(3, &h), 42);
    }

    #[test]
    fn rejects_truncated_ifd_bytes() {
        let h = header();
        let buf = vec![1u8, 0u8]; // claims one entry, but no entry bytes follow
        let err = Ifd::parse(&buf, &h).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn get_entry_by_tag_finds_matching_tag() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u16.to_le_bytes());
        push_entry(&mut buf, 322, 4, 1, [0x00, 0x01, 0x00, 0x00]); // TileWidth=256
        buf.extend_from_slice(&0u32.to_le_bytes());

        let h = header();
        let ifd = Ifd::parse(&buf, &h).unwrap();
        assert!(ifd.get_entry_by_tag(TiffTag::TileWidth).is_some());
        assert!(ifd.get_entry_by_tag(TiffTag::TileLength).is_none());
        assert_eq!(ifd.tile_width(h.byte_order), Some(256));
    }
}
