//! TIFF pyramid level identification and tile-data loading.
//!
//! WSI files contain multiple IFDs, but not all of them are pyramid levels:
//! alongside the full-resolution image and its downsampled copies, a file
//! typically also carries a label image, a macro overview, and sometimes a
//! thumbnail. This module walks the IFD chain, classifies each IFD, and
//! keeps only the ones that form a consistent resolution pyramid.
//!
//! Identification heuristics:
//! 1. Must be tiled (TileWidth/TileLength present).
//! 2. Dimensions shrink by a consistent power-of-two-ish ratio across levels.
//! 3. The largest tiled image is level 0.

use bytes::Bytes;

use crate::error::{Result, TiffError};
use crate::io::RangeSource;

use super::header::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::ifd::{Ifd, IfdEntry};
use super::tags::TiffTag;
use super::values::ValueReader;

const MAX_IFDS: usize = 100;
const MIN_PYRAMID_DIMENSION: u32 = 256;
const MAX_LABEL_DIMENSION: u32 = 2000;

/// A single level in the image pyramid. Level 0 is full resolution; higher
/// levels are progressively smaller.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub level_index: usize,
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tile_count: u32,
    pub downsample: f64,
    pub compression: u16,
    pub ifd: Ifd,
    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;
        let compression = ifd.compression(byte_order).unwrap_or(7);

        let tiles_x = (width + tile_width - 1) / tile_width;
        let tiles_y = (height + tile_height - 1) / tile_height;
        let tile_count = tiles_x * tiles_y;

        let tile_offsets_entry = ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned();
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned();
        let jpeg_tables_entry = ifd.get_entry_by_tag(TiffTag::JpegTables).cloned();

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            tile_count,
            downsample: 1.0,
            compression,
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry,
        })
    }

    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    /// Pixel dimensions of a specific tile; edge tiles may be smaller than
    /// `tile_width`/`tile_height`.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }

        let w = if tile_x == self.tiles_x - 1 {
            let remainder = self.width % self.tile_width;
            if remainder == 0 { self.tile_width } else { remainder }
        } else {
            self.tile_width
        };

        let h = if tile_y == self.tiles_y - 1 {
            let remainder = self.height % self.tile_height;
            if remainder == 0 { self.tile_height } else { remainder }
        } else {
            self.tile_height
        };

        Some((w, h))
    }
}

/// A parsed TIFF image pyramid: its levels sorted by resolution, plus any
/// IFDs that didn't qualify as pyramid levels (label, macro, thumbnail).
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<PyramidLevel>,
    pub other_ifds: Vec<(usize, Ifd)>,
}

impl TiffPyramid {
    pub fn parse<R: RangeSource>(reader: &R) -> Result<Self> {
        let header_bytes = reader.read_exact_at(0, BIGTIFF_HEADER_SIZE as u64)?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;
        let ifds = Self::parse_all_ifds(reader, &header)?;
        Self::build_pyramid(header, ifds)
    }

    fn parse_all_ifds<R: RangeSource>(reader: &R, header: &TiffHeader) -> Result<Vec<Ifd>> {
        let mut ifds = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            let count_size = header.ifd_count_size();
            let count_bytes = reader.read_exact_at(offset, count_size as u64)?;

            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            let next_offset = ifd.next_ifd_offset;
            ifds.push(ifd);
            offset = next_offset;
        }

        Ok(ifds)
    }

    fn build_pyramid(header: TiffHeader, ifds: Vec<Ifd>) -> Result<Self> {
        let byte_order = header.byte_order;

        let mut pyramid_candidates: Vec<PyramidLevel> = Vec::new();
        let mut other_ifds: Vec<(usize, Ifd)> = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            if let Some(level) = PyramidLevel::from_ifd(ifd.clone(), ifd_index, byte_order) {
                if Self::is_pyramid_candidate(&level) {
                    pyramid_candidates.push(level);
                } else {
                    other_ifds.push((ifd_index, ifd));
                }
            } else {
                other_ifds.push((ifd_index, ifd));
            }
        }

        pyramid_candidates.sort_by(|a, b| {
            let area_a = (a.width as u64) * (a.height as u64);
            let area_b = (b.width as u64) * (b.height as u64);
            area_b.cmp(&area_a)
        });

        let levels = Self::filter_pyramid_levels(pyramid_candidates);

        Ok(TiffPyramid {
            header,
            levels,
            other_ifds,
        })
    }

    fn is_pyramid_candidate(level: &PyramidLevel) -> bool {
        if level.width < MIN_PYRAMID_DIMENSION || level.height < MIN_PYRAMID_DIMENSION {
            return false;
        }
        if !level.has_tile_data() {
            return false;
        }
        if level.width <= MAX_LABEL_DIMENSION && level.height <= MAX_LABEL_DIMENSION {
            let aspect_ratio = level.width as f64 / level.height as f64;
            if aspect_ratio > 0.5 && aspect_ratio < 2.0 && level.width <= 1000 && level.height <= 1000 {
                return false;
            }
        }
        true
    }

    fn filter_pyramid_levels(candidates: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
        if candidates.is_empty() {
            return candidates;
        }

        let base_width = candidates[0].width as f64;
        let base_height = candidates[0].height as f64;

        let mut levels = Vec::new();

        for (idx, mut level) in candidates.into_iter().enumerate() {
            let downsample_x = base_width / level.width as f64;
            let downsample_y = base_height / level.height as f64;
            let downsample = (downsample_x + downsample_y) / 2.0;

            if Self::is_valid_downsample(downsample, idx) {
                level.level_index = levels.len();
                level.downsample = downsample;
                levels.push(level);
            }
        }

        levels
    }

    fn is_valid_downsample(downsample: f64, level_idx: usize) -> bool {
        if level_idx == 0 {
            return (downsample - 1.0).abs() < 0.1;
        }

        let log2 = downsample.log2();
        let rounded = log2.round();
        if rounded < 1.0 {
            return false;
        }

        let expected = 2.0_f64.powf(rounded);
        let ratio = downsample / expected;
        ratio > 0.8 && ratio < 1.2
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }

    /// The level with the smallest downsample that is still >= `downsample`,
    /// falling back to the lowest-resolution level if every level is sharper.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Option<&PyramidLevel> {
        self.levels
            .iter()
            .filter(|l| l.downsample >= downsample * 0.99)
            .min_by(|a, b| a.downsample.partial_cmp(&b.downsample).unwrap())
            .or_else(|| self.levels.last())
    }
}

/// Loaded tile location data for one pyramid level: offsets, byte counts,
/// and any JPEGTables needed to complete abbreviated JPEG streams.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    pub fn load<R: RangeSource>(reader: &R, level: &PyramidLevel, header: &TiffHeader) -> Result<Self> {
        let value_reader = ValueReader::new(reader, header);

        let offsets = if let Some(ref entry) = level.tile_offsets_entry {
            value_reader.read_u64_array(entry)?
        } else {
            return Err(TiffError::MissingTag("TileOffsets").into());
        };

        let byte_counts = if let Some(ref entry) = level.tile_byte_counts_entry {
            value_reader.read_u64_array(entry)?
        } else {
            return Err(TiffError::MissingTag("TileByteCounts").into());
        };

        let jpeg_tables = level
            .jpeg_tables_entry
            .as_ref()
            .map(|entry| value_reader.read_raw_bytes(entry))
            .transpose()?;

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        if idx >= self.offsets.len() || idx >= self.byte_counts.len() {
            return None;
        }
        Some((self.offsets[idx], self.byte_counts[idx]))
    }
}
