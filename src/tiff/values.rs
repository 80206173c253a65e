//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry (small scalars) or at an
//! offset elsewhere in the file (arrays, strings). Array values like
//! TileOffsets/TileByteCounts are fetched in a single range read each.

use bytes::Bytes;

use crate::error::{Result, TiffError};
use crate::io::RangeSource;

use super::header::{ByteOrder, TiffHeader};
use super::ifd::IfdEntry;
use super::tags::FieldType;

/// Reads tag values from a TIFF file, respecting its byte order and
/// classic/BigTIFF layout.
pub struct ValueReader<'a, R: RangeSource> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeSource> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes for an entry's value: sliced out of the inline field, or
    /// fetched from its file offset.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(&entry.value_offset_bytes[..size as usize]))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size)?)
        }
    }

    /// Reads a single scalar as u32, handling Short and Long field types.
    pub fn read_u32(&self, entry: &IfdEntry) -> Result<u32> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }

        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected count 1, got {}", entry.count),
            }
            .into());
        }

        let bytes = self.read_bytes(entry)?;
        let byte_order = self.header.byte_order;

        match field_type {
            FieldType::Short => Ok(byte_order.read_u16(&bytes) as u32),
            FieldType::Long => Ok(byte_order.read_u32(&bytes)),
            _ => Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Short or Long, got {field_type:?}"),
            }
            .into()),
        }
    }

    /// Reads a single scalar as u64, handling Short, Long and Long8 field types.
    pub fn read_u64(&self, entry: &IfdEntry) -> Result<u64> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }

        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected count 1, got {}", entry.count),
            }
            .into());
        }

        let bytes = self.read_bytes(entry)?;
        let byte_order = self.header.byte_order;

        match field_type {
            FieldType::Short => Ok(byte_order.read_u16(&bytes) as u64),
            FieldType::Long => Ok(byte_order.read_u32(&bytes) as u64),
            FieldType::Long8 => Ok(byte_order.read_u64(&bytes)),
            _ => Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Short, Long, or Long8, got {field_type:?}"),
            }
            .into()),
        }
    }

    /// Reads an array of u64 values, the primary accessor for TileOffsets
    /// and TileByteCounts.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        let byte_order = self.header.byte_order;

        match field_type {
            FieldType::Short | FieldType::Long | FieldType::Long8 => {
                Ok(parse_u64_array(&bytes, count, field_type, byte_order))
            }
            _ => Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Short, Long, or Long8 for array, got {field_type:?}"),
            }
            .into()),
        }
    }

    /// Reads an array of u32 values (tile dimensions and similar).
    pub fn read_u32_array(&self, entry: &IfdEntry) -> Result<Vec<u32>> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        let byte_order = self.header.byte_order;

        match field_type {
            FieldType::Short | FieldType::Long => Ok(parse_u32_array(&bytes, count, field_type, byte_order)),
            _ => Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Short or Long for u32 array, got {field_type:?}"),
            }
            .into()),
        }
    }

    /// Reads a null-terminated ASCII string value.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Ascii type for string, got {field_type:?}"),
            }
            .into());
        }

        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Reads raw bytes from an UNDEFINED entry (JPEGTables and similar).
    pub fn read_raw_bytes(&self, entry: &IfdEntry) -> Result<Bytes> {
        self.read_bytes(entry)
    }
}

/// Parses an array of u64 values out of raw bytes already in hand.
pub fn parse_u64_array(bytes: &[u8], count: usize, field_type: FieldType, byte_order: ByteOrder) -> Vec<u64> {
    let mut values = Vec::with_capacity(count);
    match field_type {
        FieldType::Short => {
            for i in 0..count {
                let offset = i * 2;
                if offset + 2 <= bytes.len() {
                    values.push(byte_order.read_u16(&bytes[offset..]) as u64);
                }
            }
        }
        FieldType::Long => {
            for i in 0..count {
                let offset = i * 4;
                if offset + 4 <= bytes.len() {
                    values.push(byte_order.read_u32(&bytes[offset..]) as u64);
                }
            }
        }
        FieldType::Long8 => {
            for i in 0..count {
                let offset = i * 8;
                if offset + 8 <= bytes.len() {
                    values.push(byte_order.read_u64(&bytes[offset..]));
                }
            }
        }
        _ => {}
    }
    values
}

/// Parses an array of u32 values out of raw bytes already in hand.
pub fn parse_u32_array(bytes: &[u8], count: usize, field_type: FieldType, byte_order: ByteOrder) -> Vec<u32> {
    let mut values = Vec::with_capacity(count);
    match field_type {
        FieldType::Short => {
            for i in 0..count {
                let offset = i * 2;
                if offset + 2 <= bytes.len() {
                    values.push(byte_order.read_u16(&bytes[offset..]) as u32);
                }
            }
        }
        FieldType::Long => {
            for i in 0..count {
                let offset = i * 4;
                if offset + 4 <= bytes.len() {
                    values.push(byte_order.read_u32(&bytes[offset..]));
                }
            }
        }
        _ => {}
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tiff_header() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    #[test]
    fn parse_u64_array_short() {
        let bytes = [0x64, 0x00, 0xC8, 0x00, 0x2C, 0x01, 0x90, 0x01];
        let result = parse_u64_array(&bytes, 4, FieldType::Short, ByteOrder::LittleEndian);
        assert_eq!(result, vec![100, 200, 300, 400]);
    }

    #[test]
    fn parse_u64_array_long8() {
        let bytes = [
            0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
        ];
        let result = parse_u64_array(&bytes, 2, FieldType::Long8, ByteOrder::LittleEndian);
        assert_eq!(result, vec![0x0000_0001_0000_0000, 0x0000_0002_0000_0000]);
    }

    #[test]
    fn parse_u64_array_big_endian() {
        let bytes = [0x00, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x07, 0xD0];
        let result = parse_u64_array(&bytes, 2, FieldType::Long, ByteOrder::BigEndian);
        assert_eq!(result, vec![1000, 2000]);
    }

    #[test]
    fn parse_u32_array_short() {
        let bytes = [0x00, 0x01, 0x00, 0x02];
        let result = parse_u32_array(&bytes, 2, FieldType::Short, ByteOrder::LittleEndian);
        assert_eq!(result, vec![256, 512]);
    }

    struct MockSource {
        data: Vec<u8>,
    }

    impl RangeSource for MockSource {
        fn read_exact_at(&self, offset: u64, len: u64) -> Result<Bytes> {
            let start = offset as usize;
            let end = start + len as usize;
            if end > self.data.len() {
                return Err(crate::error::IoError::RangeOutOfBounds {
                    offset,
                    requested: len,
                    size: self.data.len() as u64,
                }
                .into());
            }
            Ok(Bytes::copy_from_slice(&self.data[start..end]))
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }

        fn identifier(&self) -> &str {
            "mock://test"
        }
    }

    #[test]
    fn read_bytes_inline() {
        let reader = MockSource { data: vec![0; 100] };
        let header = make_tiff_header();
        let value_reader = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: Some(FieldType::Short),
            field_type_raw: 3,
            count: 1,
            value_offset_bytes: vec![0x00, 0x04, 0x00, 0x00],
            is_inline: true,
        };

        let bytes = value_reader.read_bytes(&entry).unwrap();
        assert_eq!(bytes, vec![0x00, 0x04]);
    }

    #[test]
    fn read_bytes_at_offset() {
        let mut data = vec![0u8; 100];
        data[50..54].copy_from_slice(&[0xAB, 0xCD, 0xEF, 0x12]);
        let reader = MockSource { data };
        let header = make_tiff_header();
        let value_reader = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count: 1,
            value_offset_bytes: vec![0x32, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        let bytes = value_reader.read_bytes(&entry).unwrap();
        assert_eq!(bytes, vec![0xAB, 0xCD, 0xEF, 0x12]);
    }

    #[test]
    fn read_u64_array_from_offset() {
        let mut data = vec![0u8; 200];
        let offsets: [u32; 5] = [1000, 2000, 3000, 4000, 5000];
        for (i, &val) in offsets.iter().enumerate() {
            let pos = 100 + i * 4;
            data[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
        }
        let reader = MockSource { data };
        let header = make_tiff_header();
        let value_reader = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 324,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count: 5,
            value_offset_bytes: vec![0x64, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        let result = value_reader.read_u64_array(&entry).unwrap();
        assert_eq!(result, vec![1000, 2000, 3000, 4000, 5000]);
    }

    #[test]
    fn read_string_strips_null_terminator() {
        let mut data = vec![0u8; 100];
        let desc = b"Aperio Image\0";
        data[20..20 + desc.len()].copy_from_slice(desc);
        let reader = MockSource { data };
        let header = make_tiff_header();
        let value_reader = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 270,
            field_type: Some(FieldType::Ascii),
            field_type_raw: 2,
            count: desc.len() as u64,
            value_offset_bytes: vec![0x14, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        let result = value_reader.read_string(&entry).unwrap();
        assert_eq!(result, "Aperio Image");
    }

    #[test]
    fn read_u32_inline() {
        let reader = MockSource { data: vec![0; 100] };
        let header = make_tiff_header();
        let value_reader = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: Some(FieldType::Long),
            field_type_raw: 4,
            count: 1,
            value_offset_bytes: vec![0x50, 0xC3, 0x00, 0x00],
            is_inline: true,
        };

        let result = value_reader.read_u32(&entry).unwrap();
        assert_eq!(result, 50000);
    }

    #[test]
    fn unknown_field_type_errors() {
        let reader = MockSource { data: vec![0; 100] };
        let header = make_tiff_header();
        let value_reader = ValueReader::new(&reader, &header);

        let entry = IfdEntry {
            tag_id: 256,
            field_type: None,
            field_type_raw: 99,
            count: 1,
            value_offset_bytes: vec![0x00, 0x00, 0x00, 0x00],
            is_inline: false,
        };

        let err = value_reader.read_bytes(&entry).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
