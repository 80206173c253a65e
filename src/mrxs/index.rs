//! `Index.dat` reader: the binary index mapping tile grid coordinates to
//! compressed image locations in the `Dat_*.dat` files.
//!
//! The index is a flat file of pointer-chasing records (page lists, not
//! unlike a tiny B-tree), so reading it is inherently sequential seek+read
//! rather than the random-access pattern the TIFF/SVS side uses. A plain
//! `std::fs::File` behind a cursor fits that access pattern directly; there
//! is no benefit to pooling it the way [`crate::tiff::TiffHandle`] pools
//! random-access file descriptors.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{MrxsError, Result};

use super::constants::{INDEX_VERSION, INDEX_VERSION_SIZE, MAX_TILE_SIZE};
use super::types::{MiraxTileRecord, PyramidLevelParameters, SlideDataInfo, SlideZoomLevel};

fn read_le_i32(file: &mut File) -> Result<i32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)
        .map_err(|e| MrxsError::InvalidRecord(format!("failed to read i32: {e}")))?;
    Ok(i32::from_le_bytes(buf))
}

/// Result of reading a non-hierarchical record: where its bytes live.
#[derive(Debug, Clone)]
pub struct NonHierRecordData {
    pub datafile_path: String,
    pub offset: i64,
    pub size: i64,
}

pub struct MrxsIndexReader {
    file: File,
    hierarchical_root: i64,
    nonhier_root: i64,
}

impl MrxsIndexReader {
    pub fn open(index_path: impl AsRef<Path>, slide_info: &SlideDataInfo) -> Result<Self> {
        let mut file = File::open(index_path.as_ref()).map_err(|e| {
            MrxsError::InvalidRecord(format!("cannot open index file: {e}"))
        })?;

        let mut version = [0u8; INDEX_VERSION_SIZE];
        file.read_exact(&mut version)
            .map_err(|e| MrxsError::InvalidRecord(format!("failed to read index version: {e}")))?;
        if version != *INDEX_VERSION.as_bytes() {
            return Err(MrxsError::UnsupportedIndexVersion(
                String::from_utf8_lossy(&version).into_owned(),
            )
            .into());
        }

        // UUID/slide ID, variable length, stored verbatim before the root pointer.
        let mut uuid_buf = vec![0u8; slide_info.slide_id.len()];
        file.read_exact(&mut uuid_buf)
            .map_err(|e| MrxsError::InvalidRecord(format!("failed to read slide UUID: {e}")))?;

        let hierarchical_root = read_le_i32(&mut file)? as i64;
        let nonhier_root = hierarchical_root + 4;

        Ok(MrxsIndexReader { file, hierarchical_root, nonhier_root })
    }

    fn seek(&mut self, offset: i64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|e| MrxsError::InvalidRecord(format!("seek failed: {e}")))?;
        Ok(())
    }

    /// Reads every tile record for one pyramid level, subdividing stored
    /// images into their logical tiles where `subtiles_per_stored_image > 1`.
    pub fn read_level_tiles(
        &mut self,
        level_index: usize,
        level_params: &PyramidLevelParameters,
        slide_info: &SlideDataInfo,
    ) -> Result<Vec<MiraxTileRecord>> {
        if level_index >= slide_info.zoom_levels.len() {
            return Err(MrxsError::InvalidRecord(format!("invalid level index: {level_index}")).into());
        }

        let level_pointer_offset = self.hierarchical_root + 4 * level_index as i64;
        self.seek(level_pointer_offset)?;
        let zoom_level_data_pointer = read_le_i32(&mut self.file)? as i64;
        self.seek(zoom_level_data_pointer)?;

        let sentinel = read_le_i32(&mut self.file)?;
        if sentinel != 0 {
            return Err(MrxsError::InvalidRecord(format!(
                "expected sentinel 0 at start of zoom data, got {sentinel}"
            ))
            .into());
        }
        let data_pages_pointer = read_le_i32(&mut self.file)? as i64;
        self.seek(data_pages_pointer)?;

        let total_images_horizontal = slide_info.images_x;
        let zoom_level = &slide_info.zoom_levels[level_index];

        let mut tiles = Vec::new();
        loop {
            let page_length = read_le_i32(&mut self.file)?;
            let next_page_pointer = read_le_i32(&mut self.file)? as i64;

            for _ in 0..page_length {
                let image_index = read_le_i32(&mut self.file)? as i64;
                let data_offset = read_le_i32(&mut self.file)? as i64;
                let data_length = read_le_i32(&mut self.file)? as i64;
                let data_file_number = read_le_i32(&mut self.file)? as i64;

                if data_offset < 0 {
                    return Err(MrxsError::InvalidRecord(format!(
                        "negative data offset {data_offset} for image {image_index}"
                    ))
                    .into());
                }
                if data_length <= 0 {
                    return Err(MrxsError::InvalidRecord(format!(
                        "invalid data length {data_length} for image {image_index}"
                    ))
                    .into());
                }
                if data_length > MAX_TILE_SIZE {
                    return Err(MrxsError::RecordTooLarge { length: data_length, max: MAX_TILE_SIZE }.into());
                }

                let image_grid_x = (image_index % total_images_horizontal as i64) as i32;
                let image_grid_y = (image_index / total_images_horizontal as i64) as i32;

                subdivide_image(
                    &mut tiles,
                    image_index,
                    image_grid_x,
                    image_grid_y,
                    data_offset,
                    data_length,
                    data_file_number,
                    level_params,
                    zoom_level,
                    slide_info,
                );
            }

            if next_page_pointer == 0 {
                break;
            }
            self.seek(next_page_pointer)?;
        }

        Ok(tiles)
    }

    pub fn read_nonhier_record(
        &mut self,
        record_index: usize,
        slide_info: &SlideDataInfo,
    ) -> Result<NonHierRecordData> {
        self.seek(self.nonhier_root)?;
        let record_array_pointer = read_le_i32(&mut self.file)? as i64;

        self.seek(record_array_pointer + 4 * record_index as i64)?;
        let record_header_pointer = read_le_i32(&mut self.file)? as i64;

        self.seek(record_header_pointer)?;
        let sentinel = read_le_i32(&mut self.file)?;
        if sentinel != 0 {
            return Err(MrxsError::InvalidRecord(format!(
                "expected sentinel 0 at start of non-hierarchical record, got {sentinel}"
            ))
            .into());
        }
        let data_page_pointer = read_le_i32(&mut self.file)? as i64;

        self.seek(data_page_pointer)?;
        let page_length = read_le_i32(&mut self.file)?;
        if page_length < 1 {
            return Err(MrxsError::InvalidRecord(
                "expected at least one item in non-hierarchical data page".to_string(),
            )
            .into());
        }

        // next-page pointer + two reserved fields
        for _ in 0..3 {
            read_le_i32(&mut self.file)?;
        }

        let data_offset = read_le_i32(&mut self.file)? as i64;
        let data_size = read_le_i32(&mut self.file)? as i64;
        let datafile_number = read_le_i32(&mut self.file)? as i64;

        let datafile_path = slide_info
            .datafile_paths
            .get(datafile_number as usize)
            .cloned()
            .ok_or_else(|| MrxsError::InvalidRecord(format!("invalid datafile number: {datafile_number}")))?;

        Ok(NonHierRecordData { datafile_path, offset: data_offset, size: data_size })
    }

    /// Reads the position-buffer non-hierarchical record, plus a second
    /// per-camera-position gain record when the data page carries one (MRXS
    /// versions >= 2.2). Duplicates the page navigation in
    /// [`Self::read_nonhier_record`] because that method only ever returns a
    /// single data item; the gain metadata shares the position record's page
    /// as a second item.
    pub fn read_position_and_gain_record(
        &mut self,
        record_index: usize,
        slide_info: &SlideDataInfo,
    ) -> Result<(NonHierRecordData, Option<NonHierRecordData>)> {
        self.seek(self.nonhier_root)?;
        let record_array_pointer = read_le_i32(&mut self.file)? as i64;

        self.seek(record_array_pointer + 4 * record_index as i64)?;
        let record_header_pointer = read_le_i32(&mut self.file)? as i64;

        self.seek(record_header_pointer)?;
        let sentinel = read_le_i32(&mut self.file)?;
        if sentinel != 0 {
            return Err(MrxsError::InvalidRecord(format!(
                "expected sentinel 0 at start of non-hierarchical record, got {sentinel}"
            ))
            .into());
        }
        let data_page_pointer = read_le_i32(&mut self.file)? as i64;

        self.seek(data_page_pointer)?;
        let page_length = read_le_i32(&mut self.file)?;
        if page_length < 1 {
            return Err(MrxsError::InvalidRecord(
                "expected at least one item in position data page".to_string(),
            )
            .into());
        }
        for _ in 0..3 {
            read_le_i32(&mut self.file)?;
        }

        let resolve = |slide_info: &SlideDataInfo, offset: i64, size: i64, fileno: i64| {
            slide_info
                .datafile_paths
                .get(fileno as usize)
                .cloned()
                .map(|datafile_path| NonHierRecordData { datafile_path, offset, size })
                .ok_or_else(|| MrxsError::InvalidRecord(format!("invalid datafile number: {fileno}")).into())
        };

        let offset = read_le_i32(&mut self.file)? as i64;
        let size = read_le_i32(&mut self.file)? as i64;
        let fileno = read_le_i32(&mut self.file)? as i64;
        let position_record: NonHierRecordData = resolve(slide_info, offset, size, fileno)?;

        let gain_record = if page_length >= 2 {
            for _ in 0..2 {
                read_le_i32(&mut self.file)?;
            }
            let offset2 = read_le_i32(&mut self.file)? as i64;
            let size2 = read_le_i32(&mut self.file)? as i64;
            let fileno2 = read_le_i32(&mut self.file)? as i64;
            Some(resolve(slide_info, offset2, size2, fileno2)?)
        } else {
            None
        };

        Ok((position_record, gain_record))
    }
}

#[allow(clippy::too_many_arguments)]
fn subdivide_image(
    tiles: &mut Vec<MiraxTileRecord>,
    image_index: i64,
    image_grid_x: i32,
    image_grid_y: i32,
    data_offset: i64,
    data_length: i64,
    data_file_number: i64,
    level_params: &PyramidLevelParameters,
    zoom_level: &SlideZoomLevel,
    slide_info: &SlideDataInfo,
) {
    let total_images_horizontal = slide_info.images_x;
    let total_images_vertical = slide_info.images_y;
    let camera_image_divisions = slide_info.image_divisions;

    let sub_tile_width = zoom_level.image_width as f64 / level_params.subtiles_per_stored_image as f64;
    let sub_tile_height = zoom_level.image_height as f64 / level_params.subtiles_per_stored_image as f64;

    for sub_tile_y_idx in 0..level_params.subtiles_per_stored_image {
        let tile_grid_y = image_grid_y + sub_tile_y_idx * camera_image_divisions;
        if tile_grid_y >= total_images_vertical {
            break;
        }
        for sub_tile_x_idx in 0..level_params.subtiles_per_stored_image {
            let tile_grid_x = image_grid_x + sub_tile_x_idx * camera_image_divisions;
            if tile_grid_x >= total_images_horizontal {
                break;
            }

            let mut gain = 1.0f32;
            if !slide_info.camera_position_gains.is_empty() {
                let camera_x = tile_grid_x / camera_image_divisions;
                let camera_y = tile_grid_y / camera_image_divisions;
                let positions_x = total_images_horizontal / camera_image_divisions;
                let camera_pos_index = (camera_y * positions_x + camera_x) as usize;
                if let Some(g) = slide_info.camera_position_gains.get(camera_pos_index) {
                    gain = *g;
                }
            }

            tiles.push(MiraxTileRecord {
                image_index,
                offset: data_offset,
                length: data_length,
                data_file_number,
                x: tile_grid_x,
                y: tile_grid_y,
                subregion_x: sub_tile_width * sub_tile_x_idx as f64,
                subregion_y: sub_tile_height * sub_tile_y_idx as f64,
                gain,
            });
        }
    }
}
