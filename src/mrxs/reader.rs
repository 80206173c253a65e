//! 3DHISTECH MRXS format reader.
//!
//! An MRXS slide is a `<name>.mrxs` stub next to a `<name>/` data directory
//! holding `Slidedat.ini`, `Index.dat`, and one or more `Dat_*.dat` payload
//! files. Unlike a TIFF pyramid, MRXS tiles are overlapping camera
//! photographs placed by measured (or, lacking that, synthetic) position
//! data, so region reads go through a per-level spatial index
//! ([`super::spatial_index::MrxsSpatialIndex`]) instead of a direct
//! coordinate division, and overlapping tiles are composited with
//! [`WriteStrategy::WeightedBlend`] rather than a plain overwrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::codec::{decode_to_rgb8, DecodedImage, SourceFormat};
use crate::config::{ExecutorConfig, PoolConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::io::QuickHashBuilder;
use crate::pipeline::writer::{TileWriter, WriteStrategy};
use crate::pipeline::{
    shift_bilinear, BlendMetadata, ExecutionStats, LevelInfo, PlanCost, RegionSpec, SlideProperties,
    TilePlan, TileReadOp,
};
use crate::slide::SlideReader;

use super::data::MrxsDataFiles;
use super::geometry::read_camera_positions;
use super::index::MrxsIndexReader;
use super::ini::{parse_slide_data_info, IniFile};
use super::plan::plan_ops_for_level;
use super::spatial_index::MrxsSpatialIndex;
use super::types::{MiraxTileRecord, MrxsImageFormat, PyramidLevelParameters, SlideDataInfo, SlideZoomLevel};

/// Metadata parsed from `Slidedat.ini`'s `GENERAL` section and level 0's
/// calibration, analogous to [`super::super::tiff::SvsMetadata`] on the TIFF
/// side.
#[derive(Debug, Clone)]
pub struct MrxsMetadata {
    pub mpp_x: f64,
    pub mpp_y: f64,
    pub objective_magnification: i32,
    pub scanner_model: &'static str,
}

/// One pyramid level's tile layout: the spatial index used for region
/// planning, plus a coordinate lookup to recover full tile records (offset,
/// length, gain) from the grid coordinates a [`TileReadOp`] carries.
struct MrxsLevelData {
    zoom_level: SlideZoomLevel,
    params: PyramidLevelParameters,
    index: MrxsSpatialIndex,
    tiles_by_coord: HashMap<(i32, i32), MiraxTileRecord>,
    logical_tile_width: f64,
    logical_tile_height: f64,
    width: u32,
    height: u32,
    downsample: f64,
}

fn source_format_for(format: MrxsImageFormat) -> SourceFormat {
    match format {
        MrxsImageFormat::Jpeg => SourceFormat::Jpeg,
        MrxsImageFormat::Png => SourceFormat::Png,
        MrxsImageFormat::Bmp => SourceFormat::Bmp,
    }
}

/// Computes one level's pixel dimensions: level 0's stitched stored-image
/// width/height (accounting for per-camera overlap trimming at the grid
/// seams), downsampled by this level's concatenation factor.
fn level_dimensions(slide_info: &SlideDataInfo, params: &PyramidLevelParameters) -> (u32, u32) {
    let level0 = &slide_info.zoom_levels[0];
    let divisions = slide_info.image_divisions.max(1);

    let mut base_width = 0f64;
    for i in 0..slide_info.images_x {
        if (i % divisions != divisions - 1) || i == slide_info.images_x - 1 {
            base_width += level0.image_width as f64;
        } else {
            base_width += level0.image_width as f64 - level0.x_overlap_pixels.ceil();
        }
    }

    let mut base_height = 0f64;
    for i in 0..slide_info.images_y {
        if (i % divisions != divisions - 1) || i == slide_info.images_y - 1 {
            base_height += level0.image_height as f64;
        } else {
            base_height += level0.image_height as f64 - level0.y_overlap_pixels.ceil();
        }
    }

    let width = (base_width / params.concatenation_factor as f64).round().max(1.0) as u32;
    let height = (base_height / params.concatenation_factor as f64).round().max(1.0) as u32;
    (width, height)
}

fn background_color(bgr: u32) -> image::Rgb<u8> {
    let b = (bgr & 0xFF) as u8;
    let g = ((bgr >> 8) & 0xFF) as u8;
    let r = ((bgr >> 16) & 0xFF) as u8;
    image::Rgb([r, g, b])
}

/// Crops the decoded stored image down to the one logical tile `tile`
/// represents (relevant when several camera subtiles share one stored
/// image), clamping the rectangle to the decoded image's actual bounds.
fn extract_logical_tile(
    decoded: &DecodedImage,
    tile: &MiraxTileRecord,
    logical_width: f64,
    logical_height: f64,
) -> image::RgbImage {
    let x = (tile.subregion_x.round() as u32).min(decoded.width.saturating_sub(1));
    let y = (tile.subregion_y.round() as u32).min(decoded.height.saturating_sub(1));
    let w = (logical_width.round() as u32).min(decoded.width - x).max(1);
    let h = (logical_height.round() as u32).min(decoded.height - y).max(1);
    image::imageops::crop_imm(&decoded.pixels, x, y, w, h).to_image()
}

/// Reader for 3DHISTECH MRXS files, implementing [`SlideReader`].
pub struct MrxsReader {
    dirname: PathBuf,
    slide_info: SlideDataInfo,
    levels: Vec<MrxsLevelData>,
    data_files: MrxsDataFiles,
    metadata: MrxsMetadata,
    properties: SlideProperties,
    executor: ExecutorConfig,
}

impl MrxsReader {
    /// Opens an MRXS slide from the path to its `.mrxs` stub file. The data
    /// directory is assumed to sit alongside it, named after the same stem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dirname = path.with_extension("");
        Self::open_dir(dirname)
    }

    /// Opens an MRXS slide directly from its data directory (the one holding
    /// `Slidedat.ini`), bypassing `.mrxs`-stub path derivation.
    pub fn open_dir(dirname: impl Into<PathBuf>) -> Result<Self> {
        Self::open_dir_with_config(dirname, PoolConfig::default(), ExecutorConfig::default())
    }

    /// Opens an MRXS slide with explicit pool and executor tunables, instead
    /// of this crate's defaults.
    pub fn open_with_config(path: impl AsRef<Path>, pool: PoolConfig, executor: ExecutorConfig) -> Result<Self> {
        let dirname = path.as_ref().with_extension("");
        Self::open_dir_with_config(dirname, pool, executor)
    }

    #[tracing::instrument(skip(dirname, pool, executor))]
    pub fn open_dir_with_config(
        dirname: impl Into<PathBuf>,
        pool: PoolConfig,
        executor: ExecutorConfig,
    ) -> Result<Self> {
        let dirname = dirname.into();
        let ini = IniFile::load(dirname.join("Slidedat.ini"))?;
        let mut slide_info = parse_slide_data_info(&ini)?;
        let level_params = slide_info.level_params();

        let data_files = MrxsDataFiles::new_with_config(&dirname, slide_info.datafile_paths.clone(), pool);
        read_camera_positions(&dirname, &mut slide_info, &data_files)?;

        let index_path = dirname.join(&slide_info.index_filename);
        let mut index_reader = MrxsIndexReader::open(&index_path, &slide_info)?;

        let base_concat = level_params.first().map(|p| p.concatenation_factor).unwrap_or(1) as f64;

        let mut levels = Vec::with_capacity(slide_info.zoom_levels.len());
        for (level_idx, params) in level_params.iter().enumerate() {
            let zoom_level = slide_info.zoom_levels[level_idx].clone();
            let tiles = index_reader.read_level_tiles(level_idx, params, &slide_info)?;

            let logical_tile_width = zoom_level.image_width as f64 / params.subtiles_per_stored_image as f64;
            let logical_tile_height = zoom_level.image_height as f64 / params.subtiles_per_stored_image as f64;

            let mut tiles_by_coord = HashMap::with_capacity(tiles.len());
            for tile in &tiles {
                tiles_by_coord.insert((tile.x, tile.y), *tile);
            }

            let index = MrxsSpatialIndex::build(tiles, params, logical_tile_width, logical_tile_height, &slide_info);
            let (width, height) = level_dimensions(&slide_info, params);
            let downsample = params.concatenation_factor as f64 / base_concat;

            levels.push(MrxsLevelData {
                zoom_level,
                params: *params,
                index,
                tiles_by_coord,
                logical_tile_width,
                logical_tile_height,
                width,
                height,
                downsample,
            });
        }

        if levels.is_empty() {
            return Err(Error::new(ErrorKind::FailedPrecondition, "slide has no pyramid levels"));
        }

        let metadata = MrxsMetadata {
            mpp_x: slide_info.zoom_levels[0].mpp_x,
            mpp_y: slide_info.zoom_levels[0].mpp_y,
            objective_magnification: slide_info.objective_magnification,
            scanner_model: "3DHISTECH",
        };

        let quickhash_seed: Arc<str> = Arc::from(slide_info.slide_id.as_str());
        let properties = SlideProperties {
            format_name: "3dhistech-mrxs",
            level_count: levels.len(),
            quickhash_seed,
        };

        tracing::info!(levels = levels.len(), slide_id = %slide_info.slide_id, "opened MRXS slide");

        Ok(MrxsReader { dirname, slide_info, levels, data_files, metadata, properties, executor })
    }

    pub fn metadata(&self) -> &MrxsMetadata {
        &self.metadata
    }

    pub fn slide_info(&self) -> &SlideDataInfo {
        &self.slide_info
    }

    /// Runs `f` on `self.executor.worker_threads` rayon threads, or the
    /// ambient global pool when unset (`0`).
    fn with_executor<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        if self.executor.worker_threads == 0 {
            f()
        } else {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.executor.worker_threads)
                .build()
                .expect("valid thread pool configuration")
                .install(f)
        }
    }

    fn decode_tile(&self, level: &MrxsLevelData, tile: &MiraxTileRecord) -> Result<image::RgbImage> {
        let raw = self.data_files.read_tile_data(tile)?;
        let decoded = decode_to_rgb8(&raw, source_format_for(level.zoom_level.image_format))?;
        Ok(extract_logical_tile(&decoded, tile, level.logical_tile_width, level.logical_tile_height))
    }
}

impl SlideReader for MrxsReader {
    fn properties(&self) -> &SlideProperties {
        &self.properties
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let l = self.levels.get(level)?;
        Some(LevelInfo {
            width: l.width,
            height: l.height,
            tile_width: l.params.horizontal_tile_step.round().max(1.0) as u32,
            tile_height: l.params.vertical_tile_step.round().max(1.0) as u32,
            downsample: l.downsample,
        })
    }

    fn tile_size(&self) -> (u32, u32) {
        self.levels
            .first()
            .map(|l| {
                (
                    l.params.horizontal_tile_step.round().max(1.0) as u32,
                    l.params.vertical_tile_step.round().max(1.0) as u32,
                )
            })
            .unwrap_or((0, 0))
    }

    fn writer_for_plan(&self, plan: &TilePlan) -> TileWriter {
        let fill = self
            .levels
            .get(plan.level)
            .map(|l| background_color(l.zoom_level.background_color_rgb))
            .unwrap_or(image::Rgb([0, 0, 0]));
        TileWriter::new(plan.output_width, plan.output_height, WriteStrategy::WeightedBlend, fill)
    }

    fn prepare_plan(&self, region: RegionSpec) -> Result<TilePlan> {
        let level_data = self.levels.get(region.level).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("level {} out of range (have {})", region.level, self.levels.len()),
            )
        })?;

        let (ops, output_width, output_height) = plan_ops_for_level(&level_data.index, level_data.downsample, &region);

        let mut bytes_estimate = 0u64;
        let mut seen_sources = std::collections::HashSet::new();
        let mut estimated_cache_hits = 0usize;
        for op in &ops {
            if let Some(tile) = level_data.tiles_by_coord.get(&(op.tile_x as i32, op.tile_y as i32)) {
                bytes_estimate += tile.length as u64;
            }
            // Several ops can share one stored image: the per-call decode
            // cache in `execute_plan` only fetches it once.
            if !seen_sources.insert((op.source_id, op.byte_offset)) {
                estimated_cache_hits += 1;
            }
        }

        Ok(TilePlan {
            level: region.level,
            output_width,
            output_height,
            cost: PlanCost { tile_count: ops.len(), bytes_estimate, estimated_cache_hits },
            ops,
        })
    }

    #[tracing::instrument(skip(self, plan, writer), fields(level = plan.level, tiles = plan.ops.len()))]
    fn execute_plan(&self, plan: &TilePlan, writer: &mut TileWriter) -> Result<ExecutionStats> {
        let level_data = self.levels.get(plan.level).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("level {} out of range (have {})", plan.level, self.levels.len()),
            )
        })?;

        // Several camera subtiles can share one stored image (physical JPEG);
        // decoding is shared across ops within this one execution rather than
        // through the crate-wide tile cache, whose key assumes a u32 tile
        // coordinate and doesn't fit MRXS's (file, byte offset) identity.
        let decode_cache: Mutex<HashMap<(i64, i64), Arc<image::RgbImage>>> = Mutex::new(HashMap::new());

        let decoded: Vec<(TileReadOp, Result<Arc<image::RgbImage>>)> = self.with_executor(|| {
            plan.ops
                .par_iter()
                .map(|op| {
                    let result = (|| {
                        let tile = *level_data
                            .tiles_by_coord
                            .get(&(op.tile_x as i32, op.tile_y as i32))
                            .ok_or_else(|| {
                                Error::new(
                                    ErrorKind::Internal,
                                    format!("plan referenced unknown tile ({}, {})", op.tile_x, op.tile_y),
                                )
                            })?;
                        let cache_key = (tile.data_file_number, tile.offset);

                        if let Some(cached) = decode_cache.lock().get(&cache_key) {
                            return Ok(Arc::clone(cached));
                        }

                        let cropped = self.decode_tile(level_data, &tile)?;
                        let cropped = Arc::new(cropped);
                        decode_cache.lock().entry(cache_key).or_insert_with(|| Arc::clone(&cropped));
                        Ok(cropped)
                    })();
                    (*op, result)
                })
                .collect()
        });

        let mut stats = ExecutionStats::default();
        for (op, result) in decoded {
            let tile_image = match result {
                Ok(tile_image) => tile_image,
                Err(err) => {
                    tracing::warn!(
                        tile_x = op.tile_x,
                        tile_y = op.tile_y,
                        error = %err,
                        "tile decode failed, leaving destination area at background"
                    );
                    stats.tiles_failed += 1;
                    continue;
                }
            };
            let gain = level_data
                .tiles_by_coord
                .get(&(op.tile_x as i32, op.tile_y as i32))
                .map(|t| t.gain)
                .unwrap_or(1.0);
            let mut cropped = image::imageops::crop_imm(
                tile_image.as_ref(),
                op.src_x.min(tile_image.width().saturating_sub(1)),
                op.src_y.min(tile_image.height().saturating_sub(1)),
                op.src_width.min(tile_image.width()),
                op.src_height.min(tile_image.height()),
            )
            .to_image();
            if op.frac_x != 0.0 || op.frac_y != 0.0 {
                cropped = shift_bilinear(&cropped, op.frac_x, op.frac_y);
            }
            let meta = BlendMetadata {
                gain,
                weight: 1.0,
                fractional_x: op.frac_x,
                fractional_y: op.frac_y,
                subpixel_resample: true,
                ..Default::default()
            };
            writer.write_tile(&cropped, op.dest_x, op.dest_y, meta);
            stats.tiles_written += 1;
        }

        Ok(stats)
    }

    fn quickhash(&self) -> Result<String> {
        let mut builder = QuickHashBuilder::new();

        let ini_bytes = crate::io::read_to_vec(self.dirname.join("Slidedat.ini"))?;
        builder.hash_data(&ini_bytes)?;

        let lowest_level = self.levels.len() - 1;
        let level_data = &self.levels[lowest_level];

        let mut seen = std::collections::HashSet::new();
        let mut coords: Vec<&MiraxTileRecord> = level_data.tiles_by_coord.values().collect();
        coords.sort_by_key(|t| (t.data_file_number, t.offset));
        for tile in coords {
            let key = (tile.data_file_number, tile.offset);
            if !seen.insert(key) {
                continue;
            }
            self.data_files.hash_tile_bytes(&mut builder, tile)?;
        }

        Ok(builder.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoom_level() -> SlideZoomLevel {
        SlideZoomLevel {
            downsample_exponent: 0,
            x_overlap_pixels: 10.0,
            y_overlap_pixels: 10.0,
            mpp_x: 0.25,
            mpp_y: 0.25,
            background_color_rgb: 0x00FFFFFF,
            image_format: MrxsImageFormat::Jpeg,
            image_width: 256,
            image_height: 256,
            section_name: "LEVEL".to_string(),
        }
    }

    fn params(concat: i32) -> PyramidLevelParameters {
        PyramidLevelParameters {
            concatenation_factor: concat,
            grid_divisor: 1,
            subtiles_per_stored_image: 1,
            camera_positions_per_tile: 1,
            horizontal_tile_step: 246.0,
            vertical_tile_step: 246.0,
        }
    }

    #[test]
    fn level_dimensions_trims_overlap_at_interior_seams() {
        let info = SlideDataInfo {
            images_x: 2,
            images_y: 1,
            image_divisions: 1,
            zoom_levels: vec![zoom_level()],
            ..Default::default()
        };
        let (w, h) = level_dimensions(&info, &params(1));
        // Two 256px images sharing a 10px overlap: only the last keeps full width.
        assert_eq!(w, 256 + (256 - 10));
        assert_eq!(h, 256);
    }

    #[test]
    fn level_dimensions_scale_by_concatenation_factor() {
        let info = SlideDataInfo {
            images_x: 1,
            images_y: 1,
            image_divisions: 1,
            zoom_levels: vec![zoom_level()],
            ..Default::default()
        };
        let (w, _) = level_dimensions(&info, &params(2));
        assert_eq!(w, 128);
    }

    #[test]
    fn background_color_unpacks_bgr() {
        let rgb = background_color(0x00102030);
        assert_eq!(rgb.0, [0x30, 0x20, 0x10]);
    }
}
