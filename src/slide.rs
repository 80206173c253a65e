//! The format-independent contract every slide plugin implements.
//!
//! Region reads are split into [`SlideReader::prepare_plan`] (pure,
//! allocates no I/O — which tiles, where they land) and
//! [`SlideReader::execute_plan`] (does the actual fetch/decode/blend,
//! typically in parallel) against a caller-supplied [`TileWriter`], so a
//! caller can composite several plans (e.g. different levels, or a region
//! spanning more than one slide) onto one shared canvas.
//! [`SlideReader::read_region`] is the convenience entry point that does all
//! three steps for a single region.

use image::Rgb;

use crate::error::Result;
use crate::pipeline::{
    ExecutionStats, Image, LevelInfo, RegionSpec, SlideProperties, TilePlan, TileWriter,
    WriteStrategy,
};

pub trait SlideReader: Send + Sync {
    fn properties(&self) -> &SlideProperties;

    fn level_count(&self) -> usize {
        self.properties().level_count
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo>;

    /// This format's native tile dimensions, taken from its finest level.
    fn tile_size(&self) -> (u32, u32);

    /// The shallowest level whose downsample does not exceed `downsample`,
    /// falling back to the deepest level if every level is sharper.
    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        let mut best = 0;
        for level in 0..self.level_count() {
            match self.level_info(level) {
                Some(info) if info.downsample <= downsample => best = level,
                _ => break,
            }
        }
        best
    }

    /// Builds a plan for `region` without performing any I/O.
    fn prepare_plan(&self, region: RegionSpec) -> Result<TilePlan>;

    /// A writer sized and initialized the way this format wants it for
    /// `plan` (overwrite vs. weighted blend, background fill color).
    fn writer_for_plan(&self, plan: &TilePlan) -> TileWriter {
        TileWriter::new(plan.output_width, plan.output_height, WriteStrategy::Overwrite, Rgb([0, 0, 0]))
    }

    /// Executes a previously built plan into `writer`, fetching, decoding,
    /// and blending tiles (in parallel where the implementation chooses to).
    /// A single tile's decode failure is logged and skipped rather than
    /// aborting the whole call; the returned [`ExecutionStats`] reports how
    /// many tiles failed.
    fn execute_plan(&self, plan: &TilePlan, writer: &mut TileWriter) -> Result<ExecutionStats>;

    /// Convenience wrapper: `prepare_plan`, `execute_plan` into a
    /// freshly-built writer, then `finalize`.
    fn read_region(&self, region: RegionSpec) -> Result<Image> {
        let plan = self.prepare_plan(region)?;
        let mut writer = self.writer_for_plan(&plan);
        let stats = self.execute_plan(&plan, &mut writer)?;
        if stats.tiles_failed > 0 {
            tracing::warn!(
                failed = stats.tiles_failed,
                written = stats.tiles_written,
                "region read completed with failed tiles"
            );
        }
        let pixels = writer.finalize();
        Ok(Image { width: plan.output_width, height: plan.output_height, pixels })
    }

    /// A deterministic content fingerprint, independent of file path or
    /// mtime, used to detect whether two slide files are byte-identical.
    fn quickhash(&self) -> Result<String>;
}
