//! Shared data model for the plan/execute region-read pipeline.
//!
//! A [`RegionSpec`] describes what the caller wants (a rectangle in
//! level-0 coordinates at some requested downsample). [`prepare_plan`]
//! (see `pipeline::plan`) turns that into a [`TilePlan`]: a pure,
//! allocation-only data structure describing which tiles to fetch and
//! where each one lands in the output, with no I/O performed. A separate
//! executor then walks the plan and does the actual work. Splitting the two
//! means a caller can inspect or cost a plan before committing to the I/O.

use std::sync::Arc;

use image::RgbImage;

/// A region request in level-0 pixel coordinates, read at the resolution of
/// `level`.
#[derive(Debug, Clone, Copy)]
pub struct RegionSpec {
    pub level: usize,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// One source tile that must be fetched, decoded, and blended into the
/// output to satisfy a [`TilePlan`].
#[derive(Debug, Clone, Copy)]
pub struct TileReadOp {
    /// Pyramid level this op reads from. Usually equal to the owning
    /// [`TilePlan::level`], but carried per-op so a caller composing several
    /// plans into one canvas (via a shared [`crate::pipeline::TileWriter`])
    /// can still tell which level each written pixel came from.
    pub level: usize,
    pub tile_x: u32,
    pub tile_y: u32,
    /// Identifies the physical storage unit backing this tile: a tile index
    /// for TIFF, or the MRXS stored-image's data-file number (several
    /// logical tiles can share one stored image).
    pub source_id: i64,
    /// Byte range of the still-compressed tile within its source file.
    pub byte_offset: u64,
    pub byte_size: u64,
    /// Destination offset within the output buffer.
    pub dest_x: i64,
    pub dest_y: i64,
    /// Sub-pixel remainder left over after `dest_x`/`dest_y` were floored to
    /// the nearest integer pixel. Zero for formats (TIFF) whose tiles always
    /// land on an integer grid.
    pub frac_x: f64,
    pub frac_y: f64,
    /// Sub-rectangle of the tile actually needed (tile-local coordinates).
    pub src_x: u32,
    pub src_y: u32,
    pub src_width: u32,
    pub src_height: u32,
}

/// An estimate of the work a plan represents, useful for backpressure or
/// logging before execution begins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanCost {
    pub tile_count: usize,
    pub bytes_estimate: u64,
    /// How many of this plan's ops are expected to be served without fresh
    /// I/O: a cache lookup for TIFF's process-wide tile cache, or a
    /// duplicate `source_id` within the same plan for MRXS's per-call decode
    /// cache.
    pub estimated_cache_hits: usize,
}

/// The result of planning a region read: which level, which tiles, and
/// where each lands in the output canvas. Carries no I/O handles.
#[derive(Debug, Clone)]
pub struct TilePlan {
    pub level: usize,
    pub output_width: u32,
    pub output_height: u32,
    pub ops: Vec<TileReadOp>,
    pub cost: PlanCost,
}

/// How a tile's pixel value is combined with whatever already occupies that
/// destination pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Running weighted mean of every tile that overlaps a pixel.
    #[default]
    WeightedAverage,
}

/// Per-tile metadata needed to blend MRXS stored images (camera gain,
/// sub-pixel placement, weighting) that TIFF tiles don't carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendMetadata {
    /// Multiplicative correction applied to the pixel value before blending.
    /// `<= 0.0` is treated as "no correction" (1.0).
    pub gain: f32,
    /// This tile's contribution weight in the running weighted mean.
    /// `<= 0.0` is treated as a unit contribution (1.0).
    pub weight: f32,
    pub mode: BlendMode,
    /// Sub-pixel remainder of this tile's destination placement, copied from
    /// the originating [`TileReadOp`].
    pub fractional_x: f64,
    pub fractional_y: f64,
    /// Whether the writer should resample the tile by
    /// `(fractional_x, fractional_y)` before compositing it.
    pub subpixel_resample: bool,
}

/// Execution-time outcome of walking a [`TilePlan`]: how many ops were
/// written and how many were skipped after a decode/fetch failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStats {
    pub tiles_written: usize,
    pub tiles_failed: usize,
}

/// A decoded region, dense RGB8, ready to hand back to the caller.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: RgbImage,
}

/// Level metadata returned by [`crate::slide::SlideReader::level_info`].
#[derive(Debug, Clone, Copy)]
pub struct LevelInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub downsample: f64,
}

/// Slide-wide metadata independent of any one level.
#[derive(Debug, Clone)]
pub struct SlideProperties {
    pub format_name: &'static str,
    pub level_count: usize,
    pub quickhash_seed: Arc<str>,
}
