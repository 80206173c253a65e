//! Aperio SVS format reader.
//!
//! SVS files are TIFF files that additionally carry:
//! - a resolution pyramid of tiled, JPEG-compressed IFDs,
//! - a label image, macro overview, and sometimes a thumbnail (all excluded
//!   from the pyramid by [`super::pyramid::TiffPyramid`]'s classification),
//! - rich metadata packed into the `ImageDescription` tag as a pipe-separated
//!   string of `key = value` pairs.
//!
//! Tiles are stored as abbreviated JPEG streams (missing their quantization
//! and Huffman tables to save space); [`super::super::codec::jpeg`] merges
//! each tile with the level's shared `JPEGTables` entry before decoding.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use image::{imageops, RgbImage};
use rayon::prelude::*;

use crate::cache::{self, CachedTile, TileKey};
use crate::codec::jpeg::prepare_tile_jpeg;
use crate::codec::{decode_to_rgb8, SourceFormat};
use crate::config::{ExecutorConfig, PoolConfig};
use crate::error::{Error, ErrorKind, Result, TiffError};
use crate::pipeline::{
    BlendMetadata, ExecutionStats, Image, LevelInfo, PlanCost, RegionSpec, SlideProperties,
    TilePlan, TileReadOp, TileWriter,
};
use crate::slide::SlideReader;

use super::handle::TiffHandle;
use super::header::TiffHeader;
use super::pyramid::{PyramidLevel, TiffPyramid, TileData};
use super::tags::QUICKHASH_TAGS;
use super::values::ValueReader;

// =============================================================================
// SVS Metadata
// =============================================================================

/// Parsed metadata from an SVS file's `ImageDescription` tag.
#[derive(Debug, Clone, Default)]
pub struct SvsMetadata {
    /// Microns per pixel (resolution).
    pub mpp: Option<f64>,
    /// Objective magnification (e.g. 20, 40).
    pub magnification: Option<f64>,
    /// Scanner vendor name.
    pub vendor: Option<String>,
    /// The full, unparsed ImageDescription string.
    pub image_description: Option<String>,
    /// Every `key = value` pair found, including ones with no dedicated field.
    pub properties: HashMap<String, String>,
}

impl SvsMetadata {
    /// Parses an ImageDescription string of the form
    /// `Aperio Image Library vXX.X.X\nWxH (tw x th) JPEG/RGB Q=70|AppMag = 20|MPP = 0.5|...`.
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            image_description: Some(description.to_string()),
            ..Default::default()
        };

        if description.contains("Aperio") {
            metadata.vendor = Some("Aperio".to_string());
        }

        for part in description.split('|') {
            let part = part.trim();
            let Some(eq_pos) = part.find('=') else {
                continue;
            };
            let key = part[..eq_pos].trim();
            let value = part[eq_pos + 1..].trim();
            metadata.properties.insert(key.to_string(), value.to_string());

            match key {
                "MPP" => {
                    if let Ok(mpp) = value.parse::<f64>() {
                        metadata.mpp = Some(mpp);
                    }
                }
                "AppMag" => {
                    if let Ok(mag) = value.parse::<f64>() {
                        metadata.magnification = Some(mag);
                    }
                }
                _ => {}
            }
        }

        metadata
    }
}

// =============================================================================
// SVS Level Data
// =============================================================================

/// A pyramid level plus the tile location table and JPEGTables needed to
/// actually fetch and decode its tiles.
#[derive(Debug, Clone)]
pub struct SvsLevelData {
    pub level: PyramidLevel,
    pub tile_data: TileData,
}

impl SvsLevelData {
    pub fn get_tile_location(&self, tile_x: u32, tile_y: u32) -> Option<(u64, u64)> {
        let tile_index = self.level.tile_index(tile_x, tile_y)?;
        self.tile_data.get_tile_location(tile_index)
    }

    pub fn jpeg_tables(&self) -> Option<&Bytes> {
        self.tile_data.jpeg_tables.as_ref()
    }
}

/// Pure tiling math: which tiles of `level` cover `region`, and where each
/// one lands in the level-local output canvas. Kept free of I/O so it can be
/// exercised directly in tests.
fn plan_ops_for_level(
    level: &PyramidLevel,
    region: &RegionSpec,
) -> (Vec<TileReadOp>, u32, u32) {
    let downsample = if level.downsample > 0.0 { level.downsample } else { 1.0 };

    let level_x0 = (region.x as f64 / downsample).floor() as i64;
    let level_y0 = (region.y as f64 / downsample).floor() as i64;
    let level_w = ((region.width as f64 / downsample).round() as u32).max(1);
    let level_h = ((region.height as f64 / downsample).round() as u32).max(1);

    let tile_w = level.tile_width as i64;
    let tile_h = level.tile_height as i64;
    if tile_w == 0 || tile_h == 0 || level.tiles_x == 0 || level.tiles_y == 0 {
        return (Vec::new(), level_w, level_h);
    }

    let tx_start = level_x0.div_euclid(tile_w).max(0);
    let ty_start = level_y0.div_euclid(tile_h).max(0);
    let tx_end = (level_x0 + level_w as i64 - 1).div_euclid(tile_w).min(level.tiles_x as i64 - 1);
    let ty_end = (level_y0 + level_h as i64 - 1).div_euclid(tile_h).min(level.tiles_y as i64 - 1);

    let mut ops = Vec::new();
    if tx_end < tx_start || ty_end < ty_start {
        return (ops, level_w, level_h);
    }

    for ty in ty_start..=ty_end {
        for tx in tx_start..=tx_end {
            let (tw, th) = level
                .tile_dimensions(tx as u32, ty as u32)
                .unwrap_or((level.tile_width, level.tile_height));
            let tile_origin_x = tx * tile_w;
            let tile_origin_y = ty * tile_h;

            let ix0 = tile_origin_x.max(level_x0);
            let iy0 = tile_origin_y.max(level_y0);
            let ix1 = (tile_origin_x + tw as i64).min(level_x0 + level_w as i64);
            let iy1 = (tile_origin_y + th as i64).min(level_y0 + level_h as i64);

            if ix1 <= ix0 || iy1 <= iy0 {
                continue;
            }

            let source_id = level.tile_index(tx as u32, ty as u32).unwrap_or(0) as i64;

            ops.push(TileReadOp {
                level: region.level,
                tile_x: tx as u32,
                tile_y: ty as u32,
                source_id,
                byte_offset: 0,
                byte_size: 0,
                dest_x: ix0 - level_x0,
                dest_y: iy0 - level_y0,
                frac_x: 0.0,
                frac_y: 0.0,
                src_x: (ix0 - tile_origin_x) as u32,
                src_y: (iy0 - tile_origin_y) as u32,
                src_width: (ix1 - ix0) as u32,
                src_height: (iy1 - iy0) as u32,
            });
        }
    }

    (ops, level_w, level_h)
}

// =============================================================================
// SVS Reader
// =============================================================================

/// Reader for Aperio SVS files: a pooled file handle over a classified TIFF
/// pyramid, implementing [`SlideReader`].
pub struct SvsReader {
    handle: TiffHandle,
    header: TiffHeader,
    levels: Vec<SvsLevelData>,
    metadata: SvsMetadata,
    properties: SlideProperties,
    executor: ExecutorConfig,
}

impl SvsReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default(), ExecutorConfig::default())
    }

    pub fn open_with_capacity(path: impl AsRef<Path>, max_handles: usize) -> Result<Self> {
        Self::open_with_config(
            path,
            PoolConfig { max_handles, ..PoolConfig::default() },
            ExecutorConfig::default(),
        )
    }

    /// Opens a slide with explicit pool and executor tunables, instead of
    /// this crate's defaults.
    #[tracing::instrument(skip(pool, executor), fields(path = %path.as_ref().display()))]
    pub fn open_with_config(path: impl AsRef<Path>, pool: PoolConfig, executor: ExecutorConfig) -> Result<Self> {
        let handle = TiffHandle::open_with_config(path, pool)?;
        Self::from_handle(handle, executor)
    }

    fn from_handle(handle: TiffHandle, executor: ExecutorConfig) -> Result<Self> {
        let pyramid = TiffPyramid::parse(&handle)?;

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            let tile_data = TileData::load(&handle, level, &pyramid.header)?;
            levels.push(SvsLevelData {
                level: level.clone(),
                tile_data,
            });
        }

        let metadata = Self::parse_metadata(&handle, &pyramid)?;

        let properties = SlideProperties {
            format_name: "aperio-svs",
            level_count: levels.len(),
            quickhash_seed: Arc::from(handle.identifier()),
        };

        tracing::info!(levels = levels.len(), identifier = handle.identifier(), "opened SVS slide");

        Ok(SvsReader {
            handle,
            header: pyramid.header,
            levels,
            metadata,
            properties,
            executor,
        })
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

    fn parse_metadata(handle: &TiffHandle, pyramid: &TiffPyramid) -> Result<SvsMetadata> {
        let Some(first_level) = pyramid.levels.first() else {
            return Ok(SvsMetadata::default());
        };

        let Some(entry) = first_level.ifd.get_entry_by_tag(super::tags::TiffTag::ImageDescription) else {
            return Ok(SvsMetadata::default());
        };

        let value_reader = ValueReader::new(handle, &pyramid.header);
        let description = value_reader.read_string(entry)?;
        Ok(SvsMetadata::parse(&description))
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn metadata(&self) -> &SvsMetadata {
        &self.metadata
    }

    pub fn get_level(&self, level: usize) -> Option<&SvsLevelData> {
        self.levels.get(level)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.levels.first().map(|l| (l.level.width, l.level.height))
    }

    /// Reads raw, still-compressed tile bytes straight off disk.
    pub fn read_raw_tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<Bytes> {
        let level_data = self.levels.get(level).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("level {level} out of range (have {})", self.levels.len()),
            )
        })?;
        let (offset, size) = level_data
            .get_tile_location(tile_x, tile_y)
            .ok_or(TiffError::InvalidTileCoord(tile_x, tile_y))?;
        Ok(self.handle.read_exact_at(offset, size)?)
    }

    /// Reads a tile and completes it into a standalone decodable JPEG,
    /// merging `JPEGTables` if the tile is an abbreviated stream.
    pub fn read_tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<Bytes> {
        let raw = self.read_raw_tile(level, tile_x, tile_y)?;
        let level_data = &self.levels[level];
        let tables = level_data.jpeg_tables();
        Ok(prepare_tile_jpeg(tables.map(|t| t.as_ref()), &raw))
    }

    fn decode_tile(&self, level: usize, tile_x: u32, tile_y: u32) -> Result<CachedTile> {
        let key = TileKey::new(self.handle.identifier().to_string(), level as u32, tile_x, tile_y);
        if let Some(cached) = cache::global().get(&key) {
            return Ok(cached);
        }

        let jpeg = self.read_tile(level, tile_x, tile_y)?;
        let decoded = decode_to_rgb8(&jpeg, SourceFormat::Jpeg)?;
        let tile = Arc::new(decoded);
        cache::global().put(key, Arc::clone(&tile));
        Ok(tile)
    }
}

impl SlideReader for SvsReader {
    fn properties(&self) -> &SlideProperties {
        &self.properties
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let l = &self.levels.get(level)?.level;
        Some(LevelInfo {
            width: l.width,
            height: l.height,
            tile_width: l.tile_width,
            tile_height: l.tile_height,
            downsample: l.downsample,
        })
    }

    fn tile_size(&self) -> (u32, u32) {
        self.levels
            .first()
            .map(|l| (l.level.tile_width, l.level.tile_height))
            .unwrap_or((0, 0))
    }

    fn prepare_plan(&self, region: RegionSpec) -> Result<TilePlan> {
        let level_data = self.levels.get(region.level).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("level {} out of range (have {})", region.level, self.levels.len()),
            )
        })?;

        let (mut ops, output_width, output_height) = plan_ops_for_level(&level_data.level, &region);

        let mut bytes_estimate = 0u64;
        let mut estimated_cache_hits = 0usize;
        for op in ops.iter_mut() {
            if let Some((offset, size)) = level_data.get_tile_location(op.tile_x, op.tile_y) {
                op.byte_offset = offset;
                op.byte_size = size;
                bytes_estimate += size;
            }
            let key = TileKey::new(self.handle.identifier().to_string(), region.level as u32, op.tile_x, op.tile_y);
            if cache::global().contains(&key) {
                estimated_cache_hits += 1;
            }
        }

        Ok(TilePlan {
            level: region.level,
            output_width,
            output_height,
            cost: PlanCost {
                tile_count: ops.len(),
                bytes_estimate,
                estimated_cache_hits,
            },
            ops,
        })
    }

    #[tracing::instrument(skip(self, plan, writer), fields(level = plan.level, tiles = plan.ops.len()))]
    fn execute_plan(&self, plan: &TilePlan, writer: &mut TileWriter) -> Result<ExecutionStats> {
        if self.levels.get(plan.level).is_none() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("level {} out of range (have {})", plan.level, self.levels.len()),
            ));
        }

        let decoded: Vec<(TileReadOp, Result<CachedTile>)> = self.with_executor(|| {
            plan.ops
                .par_iter()
                .map(|op| (*op, self.decode_tile(plan.level, op.tile_x, op.tile_y)))
                .collect()
        });

        let mut stats = ExecutionStats::default();
        for (op, result) in decoded {
            let tile = match result {
                Ok(tile) => tile,
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
            let cropped: RgbImage =
                imageops::crop_imm(&tile.pixels, op.src_x, op.src_y, op.src_width, op.src_height).to_image();
            writer.write_tile(&cropped, op.dest_x, op.dest_y, BlendMetadata::default());
            stats.tiles_written += 1;
        }

        Ok(stats)
    }

    fn quickhash(&self) -> Result<String> {
        let base = self
            .levels
            .first()
            .ok_or_else(|| Error::new(ErrorKind::FailedPrecondition, "slide has no pyramid levels"))?;

        let mut builder = crate::io::QuickHashBuilder::new();
        let value_reader = ValueReader::new(&self.handle, &self.header);
        for tag in QUICKHASH_TAGS {
            let Some(entry) = base.level.ifd.get_entry_by_tag(tag) else {
                continue;
            };
            if let Ok(s) = value_reader.read_string(entry) {
                builder.hash_data(s.as_bytes())?;
            }
        }

        // Hash the smallest level's tile bytes rather than the base level's:
        // same discriminating power, far less I/O.
        let smallest = self.levels.last().unwrap();
        for tile_index in 0..smallest.tile_data.offsets.len() as u32 {
            if let Some((offset, size)) = smallest.tile_data.get_tile_location(tile_index) {
                builder.hash_file_part(&self.handle, offset, size)?;
            }
        }

        Ok(builder.finalize())
    }
}
