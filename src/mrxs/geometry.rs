//! Camera position data and per-tile spatial placement.
//!
//! MRXS tiles are overlapping photographs; `horizontal_tile_step`/
//! `vertical_tile_step` (see [`super::types::PyramidLevelParameters`]) give a
//! synthetic grid placement when no camera position data exists, but real
//! slides carry a `VIMSLIDE_POSITION_BUFFER` or `StitchingIntensityLayer`
//! non-hierarchical record recording each camera's actual (x, y) offset, used
//! here in preference to the synthetic grid whenever it is present.

use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;

use crate::error::{MrxsError, Result};

use super::constants::{POSITION_LAYER_COMPRESSED, POSITION_LAYER_UNCOMPRESSED, POSITION_RECORD_SIZE};
use super::data::MrxsDataFiles;
use super::index::{MrxsIndexReader, NonHierRecordData};
use super::types::{MiraxTileRecord, PyramidLevelParameters, SlideDataInfo};

/// A tile's axis-aligned bounding box in one pyramid level's pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2D {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Box2D {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn intersects(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        self.min_x < x + width && self.max_x > x && self.min_y < y + height && self.max_y > y
    }
}

/// Returns the `position_layer_name` constant to look for, and whether its
/// payload is zlib-compressed, given the layer name found in Slidedat.ini.
pub fn classify_position_layer(name: &str) -> Option<bool> {
    if name == POSITION_LAYER_UNCOMPRESSED {
        Some(false)
    } else if name == POSITION_LAYER_COMPRESSED {
        Some(true)
    } else {
        None
    }
}

fn read_record(
    data_files: &MrxsDataFiles,
    slide_info: &SlideDataInfo,
    record: &NonHierRecordData,
) -> Result<Vec<u8>> {
    let file_number = slide_info
        .datafile_paths
        .iter()
        .position(|p| p == &record.datafile_path)
        .ok_or_else(|| MrxsError::InvalidRecord(format!("unknown data file: {}", record.datafile_path)))?;
    data_files.read_range(file_number, record.offset, record.size)
}

fn zlib_magic(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x78 && data[1] == 0x9C
}

fn inflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MrxsError::Inflate(e.to_string()))?;
    Ok(out)
}

/// Reads camera positions (and, if present, per-position intensity gains)
/// from the index file's position-buffer non-hierarchical record, filling in
/// `slide_info.camera_positions`/`camera_position_gains`. A no-op, leaving
/// `using_synthetic_positions` as already set by INI parsing, when no
/// position layer was found.
pub fn read_camera_positions(
    dirname: &Path,
    slide_info: &mut SlideDataInfo,
    data_files: &MrxsDataFiles,
) -> Result<()> {
    if slide_info.using_synthetic_positions {
        return Ok(());
    }
    let Some(position_record) = slide_info.position_layer_record_offset else {
        slide_info.using_synthetic_positions = true;
        return Ok(());
    };

    let index_path = dirname.join(&slide_info.index_filename);
    let mut index_reader = MrxsIndexReader::open(&index_path, slide_info)?;
    let (position_data, gain_data) =
        index_reader.read_position_and_gain_record(position_record, slide_info)?;

    let positions_x = slide_info.images_x / slide_info.image_divisions.max(1);
    let positions_y = slide_info.images_y / slide_info.image_divisions.max(1);
    let npositions = (positions_x * positions_y) as usize;

    if let Some(gain_record) = gain_data {
        let raw = read_record(data_files, slide_info, &gain_record)?;
        let expected = npositions * 4;
        let bytes = if zlib_magic(&raw) { inflate(&raw, expected)? } else { raw };
        let mut gains = Vec::with_capacity(bytes.len() / 4);
        for chunk in bytes.chunks_exact(4) {
            gains.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        slide_info.camera_position_gains = gains;
    }

    let raw = read_record(data_files, slide_info, &position_data)?;
    let expected = npositions * POSITION_RECORD_SIZE;
    let bytes = if slide_info.position_layer_compressed && zlib_magic(&raw) {
        inflate(&raw, expected)?
    } else {
        raw
    };

    if bytes.len() != expected {
        return Err(MrxsError::InvalidRecord(format!(
            "position buffer size mismatch: expected {expected}, got {}",
            bytes.len()
        ))
        .into());
    }

    let level_0_concat = 1i32 << slide_info.zoom_levels[0].downsample_exponent;
    let mut positions = Vec::with_capacity(npositions);
    for chunk in bytes.chunks_exact(POSITION_RECORD_SIZE) {
        let x = i32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
        let y = i32::from_le_bytes([chunk[5], chunk[6], chunk[7], chunk[8]]);
        positions.push((x * level_0_concat, y * level_0_concat));
    }
    slide_info.camera_positions = positions;
    slide_info.using_synthetic_positions = false;

    Ok(())
}

/// Computes a tile's bounding box in its pyramid level's pixel space, using
/// measured camera positions when available and falling back to the
/// synthetic tile-step grid otherwise.
pub fn tile_bounding_box(
    tile: &MiraxTileRecord,
    level_params: &PyramidLevelParameters,
    tile_width: f64,
    tile_height: f64,
    slide_info: &SlideDataInfo,
) -> Box2D {
    let image_divisions = slide_info.image_divisions.max(1);

    let (min_x, min_y) = if !slide_info.using_synthetic_positions && !slide_info.camera_positions.is_empty() {
        let camera_x = tile.x / image_divisions;
        let camera_y = tile.y / image_divisions;
        let positions_x = (slide_info.images_x / image_divisions).max(1);
        let camera_pos_index = (camera_y * positions_x + camera_x) as usize;

        match slide_info.camera_positions.get(camera_pos_index) {
            Some((x, y)) => (
                *x as f64 / level_params.concatenation_factor as f64,
                *y as f64 / level_params.concatenation_factor as f64,
            ),
            None => synthetic_position(tile, level_params),
        }
    } else {
        synthetic_position(tile, level_params)
    };

    Box2D { min_x, min_y, max_x: min_x + tile_width, max_y: min_y + tile_height }
}

fn synthetic_position(tile: &MiraxTileRecord, level_params: &PyramidLevelParameters) -> (f64, f64) {
    let grid_x = tile.x / level_params.grid_divisor;
    let grid_y = tile.y / level_params.grid_divisor;
    (grid_x as f64 * level_params.horizontal_tile_step, grid_y as f64 * level_params.vertical_tile_step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: i32, y: i32) -> MiraxTileRecord {
        MiraxTileRecord {
            image_index: 0,
            offset: 0,
            length: 100,
            data_file_number: 0,
            x,
            y,
            subregion_x: 0.0,
            subregion_y: 0.0,
            gain: 1.0,
        }
    }

    fn level_params() -> PyramidLevelParameters {
        PyramidLevelParameters {
            concatenation_factor: 1,
            grid_divisor: 1,
            subtiles_per_stored_image: 1,
            camera_positions_per_tile: 1,
            horizontal_tile_step: 230.0,
            vertical_tile_step: 230.0,
        }
    }

    #[test]
    fn synthetic_grid_placement_without_positions() {
        let info = SlideDataInfo { using_synthetic_positions: true, ..Default::default() };
        let bbox = tile_bounding_box(&tile(2, 3), &level_params(), 256.0, 256.0, &info);
        assert_eq!(bbox.min_x, 460.0);
        assert_eq!(bbox.min_y, 690.0);
        assert_eq!(bbox.width(), 256.0);
    }

    #[test]
    fn measured_positions_override_synthetic_grid() {
        let info = SlideDataInfo {
            using_synthetic_positions: false,
            images_x: 4,
            image_divisions: 1,
            camera_positions: vec![(0, 0), (300, 0), (0, 300), (300, 300)],
            ..Default::default()
        };
        let bbox = tile_bounding_box(&tile(1, 1), &level_params(), 256.0, 256.0, &info);
        assert_eq!(bbox.min_x, 300.0);
        assert_eq!(bbox.min_y, 300.0);
    }

    #[test]
    fn box_intersects_detects_overlap_and_disjoint() {
        let b = Box2D { min_x: 0.0, min_y: 0.0, max_x: 100.0, max_y: 100.0 };
        assert!(b.intersects(50.0, 50.0, 20.0, 20.0));
        assert!(!b.intersects(200.0, 200.0, 20.0, 20.0));
    }

    #[test]
    fn classify_position_layer_recognizes_both_variants() {
        assert_eq!(classify_position_layer("VIMSLIDE_POSITION_BUFFER"), Some(false));
        assert_eq!(classify_position_layer("StitchingIntensityLayer"), Some(true));
        assert_eq!(classify_position_layer("Other"), None);
    }
}
