//! Grid-hash spatial index over one pyramid level's tiles.
//!
//! MRXS tiles can overlap (camera fields of view physically overlap on the
//! slide), so a region read can't be answered by a simple coordinate
//! division the way a strictly tiled TIFF level can — a query rectangle may
//! intersect tiles whose bounding boxes straddle more than one grid cell.
//! Tiles are bucketed into cells sized to the largest tile dimension on the
//! level, and a query walks every cell its rectangle touches, deduplicating
//! with a `HashSet` since one tile can land in several cells.

use std::collections::{HashMap, HashSet};

use super::geometry::{tile_bounding_box, Box2D};
use super::types::{MiraxTileRecord, PyramidLevelParameters, SlideDataInfo};

pub struct MrxsSpatialIndex {
    tiles: Vec<MiraxTileRecord>,
    bboxes: Vec<Box2D>,
    cells: HashMap<(i64, i64), Vec<usize>>,
    cell_size: f64,
}

impl MrxsSpatialIndex {
    pub fn build(
        tiles: Vec<MiraxTileRecord>,
        level_params: &PyramidLevelParameters,
        tile_width: f64,
        tile_height: f64,
        slide_info: &SlideDataInfo,
    ) -> Self {
        let cell_size = tile_width.max(tile_height).max(1.0);
        let mut bboxes = Vec::with_capacity(tiles.len());
        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

        for (idx, tile) in tiles.iter().enumerate() {
            let bbox = tile_bounding_box(tile, level_params, tile_width, tile_height, slide_info);

            let cell_x0 = (bbox.min_x / cell_size).floor() as i64;
            let cell_y0 = (bbox.min_y / cell_size).floor() as i64;
            let cell_x1 = ((bbox.max_x - 1e-9) / cell_size).floor() as i64;
            let cell_y1 = ((bbox.max_y - 1e-9) / cell_size).floor() as i64;

            for cy in cell_y0..=cell_y1 {
                for cx in cell_x0..=cell_x1 {
                    cells.entry((cx, cy)).or_default().push(idx);
                }
            }

            bboxes.push(bbox);
        }

        MrxsSpatialIndex { tiles, bboxes, cells, cell_size }
    }

    /// Returns the indices of tiles whose bounding box intersects the given
    /// rectangle, each appearing at most once.
    pub fn query_region(&self, x: f64, y: f64, width: f64, height: f64) -> Vec<usize> {
        if self.tiles.is_empty() || width <= 0.0 || height <= 0.0 {
            return Vec::new();
        }

        let cell_x0 = (x / self.cell_size).floor() as i64;
        let cell_y0 = (y / self.cell_size).floor() as i64;
        let cell_x1 = ((x + width - 1e-9) / self.cell_size).floor() as i64;
        let cell_y1 = ((y + height - 1e-9) / self.cell_size).floor() as i64;

        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for cy in cell_y0..=cell_y1 {
            for cx in cell_x0..=cell_x1 {
                let Some(candidates) = self.cells.get(&(cx, cy)) else { continue };
                for &idx in candidates {
                    if !seen.insert(idx) {
                        continue;
                    }
                    if self.bboxes[idx].intersects(x, y, width, height) {
                        matches.push(idx);
                    }
                }
            }
        }
        matches
    }

    pub fn tile(&self, index: usize) -> &MiraxTileRecord {
        &self.tiles[index]
    }

    pub fn bbox(&self, index: usize) -> &Box2D {
        &self.bboxes[index]
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: i32, y: i32) -> MiraxTileRecord {
        MiraxTileRecord {
            image_index: 0,
            offset: 0,
            length: 10,
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
            horizontal_tile_step: 100.0,
            vertical_tile_step: 100.0,
        }
    }

    #[test]
    fn query_finds_tiles_in_overlapping_cells() {
        let tiles = vec![tile(0, 0), tile(1, 0), tile(0, 1), tile(5, 5)];
        let info = SlideDataInfo { using_synthetic_positions: true, ..Default::default() };
        let index = MrxsSpatialIndex::build(tiles, &level_params(), 100.0, 100.0, &info);

        let hits = index.query_region(50.0, 50.0, 60.0, 60.0);
        assert_eq!(hits.len(), 3);
        assert!(!hits.contains(&3));
    }

    #[test]
    fn query_outside_all_tiles_is_empty() {
        let tiles = vec![tile(0, 0)];
        let info = SlideDataInfo { using_synthetic_positions: true, ..Default::default() };
        let index = MrxsSpatialIndex::build(tiles, &level_params(), 100.0, 100.0, &info);
        assert!(index.query_region(1000.0, 1000.0, 10.0, 10.0).is_empty());
    }

    #[test]
    fn empty_index_returns_no_matches() {
        let info = SlideDataInfo::default();
        let index = MrxsSpatialIndex::build(Vec::new(), &level_params(), 100.0, 100.0, &info);
        assert!(index.query_region(0.0, 0.0, 10.0, 10.0).is_empty());
    }
}
