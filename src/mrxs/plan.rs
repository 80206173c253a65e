//! Pure tiling math: which tiles of one level satisfy a region request, and
//! where each lands in the level-local output canvas. Mirrors the TIFF side's
//! `plan_ops_for_level`, but source tiles come from a spatial index instead
//! of a direct coordinate division, since MRXS tiles can overlap.

use crate::pipeline::{RegionSpec, TileReadOp};

use super::spatial_index::MrxsSpatialIndex;

pub fn plan_ops_for_level(
    index: &MrxsSpatialIndex,
    downsample: f64,
    region: &RegionSpec,
) -> (Vec<TileReadOp>, u32, u32) {
    let downsample = if downsample > 0.0 { downsample } else { 1.0 };

    let level_x0 = region.x as f64 / downsample;
    let level_y0 = region.y as f64 / downsample;
    let level_w = (region.width as f64 / downsample).round().max(1.0);
    let level_h = (region.height as f64 / downsample).round().max(1.0);

    let candidates = index.query_region(level_x0, level_y0, level_w, level_h);

    let mut ops = Vec::with_capacity(candidates.len());
    for idx in candidates {
        let bbox = index.bbox(idx);
        let tile = index.tile(idx);

        let ix0 = bbox.min_x.max(level_x0);
        let iy0 = bbox.min_y.max(level_y0);
        let ix1 = bbox.max_x.min(level_x0 + level_w);
        let iy1 = bbox.max_y.min(level_y0 + level_h);
        if ix1 <= ix0 || iy1 <= iy0 {
            continue;
        }

        let dest_x_f = ix0 - level_x0;
        let dest_y_f = iy0 - level_y0;
        let dest_x = dest_x_f.floor();
        let dest_y = dest_y_f.floor();

        ops.push(TileReadOp {
            level: region.level,
            tile_x: tile.x as u32,
            tile_y: tile.y as u32,
            source_id: tile.data_file_number,
            byte_offset: tile.offset as u64,
            byte_size: tile.length as u64,
            dest_x: dest_x as i64,
            dest_y: dest_y as i64,
            frac_x: dest_x_f - dest_x,
            frac_y: dest_y_f - dest_y,
            src_x: (ix0 - bbox.min_x).round().max(0.0) as u32,
            src_y: (iy0 - bbox.min_y).round().max(0.0) as u32,
            src_width: (ix1 - ix0).round().max(1.0) as u32,
            src_height: (iy1 - iy0).round().max(1.0) as u32,
        });
    }

    (ops, level_w as u32, level_h as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrxs::types::{MiraxTileRecord, PyramidLevelParameters, SlideDataInfo};

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
    fn plan_covers_requested_region_with_clipped_ops() {
        let tiles = vec![tile(0, 0), tile(1, 0), tile(0, 1), tile(1, 1)];
        let info = SlideDataInfo { using_synthetic_positions: true, ..Default::default() };
        let index = MrxsSpatialIndex::build(tiles, &level_params(), 100.0, 100.0, &info);

        let region = RegionSpec { level: 0, x: 50, y: 50, width: 100, height: 100 };
        let (ops, w, h) = plan_ops_for_level(&index, 1.0, &region);

        assert_eq!(w, 100);
        assert_eq!(h, 100);
        assert_eq!(ops.len(), 4);
        for op in &ops {
            assert!(op.src_width > 0 && op.src_height > 0);
        }
    }

    #[test]
    fn plan_applies_downsample_to_region_bounds() {
        let tiles = vec![tile(0, 0)];
        let info = SlideDataInfo { using_synthetic_positions: true, ..Default::default() };
        let index = MrxsSpatialIndex::build(tiles, &level_params(), 100.0, 100.0, &info);

        let region = RegionSpec { level: 1, x: 0, y: 0, width: 200, height: 200 };
        let (ops, w, h) = plan_ops_for_level(&index, 2.0, &region);
        assert_eq!(w, 100);
        assert_eq!(h, 100);
        assert_eq!(ops.len(), 1);
    }
}
