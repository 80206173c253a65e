//! Compositing decoded tiles into the output canvas.
//!
//! TIFF tiles tile the plane exactly, so writing one is a plain overwrite.
//! MRXS stored images overlap (camera fields of view physically overlap on
//! the slide) and each carries its own gain, so writing one there means
//! blending against whatever is already in the destination, weighted by
//! gain. [`TileWriter`] picks the strategy per call so the plan executor
//! doesn't need to know which format it's serving.

use image::{Rgb, RgbImage};

use crate::pipeline::types::BlendMetadata;

#[derive(Debug, Clone, Copy)]
pub enum WriteStrategy {
    Overwrite,
    WeightedBlend,
}

pub struct TileWriter {
    canvas: RgbImage,
    /// Accumulated weight per output pixel, only used in weighted-blend mode.
    weights: Vec<f32>,
    strategy: WriteStrategy,
}

impl TileWriter {
    pub fn new(width: u32, height: u32, strategy: WriteStrategy, fill: Rgb<u8>) -> Self {
        let mut canvas = RgbImage::new(width, height);
        for px in canvas.pixels_mut() {
            *px = fill;
        }
        TileWriter {
            weights: vec![0.0; (width as usize) * (height as usize)],
            canvas,
            strategy,
        }
    }

    pub fn fill_with_color(&mut self, color: Rgb<u8>) {
        for px in self.canvas.pixels_mut() {
            *px = color;
        }
        self.weights.iter_mut().for_each(|w| *w = 0.0);
    }

    /// Writes `tile` at `(dest_x, dest_y)`, clipping to the canvas bounds.
    pub fn write_tile(
        &mut self,
        tile: &RgbImage,
        dest_x: i64,
        dest_y: i64,
        meta: BlendMetadata,
    ) {
        match self.strategy {
            WriteStrategy::Overwrite => self.write_overwrite(tile, dest_x, dest_y),
            WriteStrategy::WeightedBlend => self.write_weighted(tile, dest_x, dest_y, meta),
        }
    }

    fn write_overwrite(&mut self, tile: &RgbImage, dest_x: i64, dest_y: i64) {
        let (cw, ch) = (self.canvas.width() as i64, self.canvas.height() as i64);
        for ty in 0..tile.height() {
            let oy = dest_y + ty as i64;
            if oy < 0 || oy >= ch {
                continue;
            }
            for tx in 0..tile.width() {
                let ox = dest_x + tx as i64;
                if ox < 0 || ox >= cw {
                    continue;
                }
                self.canvas
                    .put_pixel(ox as u32, oy as u32, *tile.get_pixel(tx, ty));
            }
        }
    }

    fn write_weighted(&mut self, tile: &RgbImage, dest_x: i64, dest_y: i64, meta: BlendMetadata) {
        // `gain` corrects the pixel's intensity (e.g. a camera's per-tile
        // exposure calibration); `contribution` is this tile's share of the
        // running weighted mean. They are independent: a gain-corrected
        // pixel still contributes with whatever weight the caller picked,
        // and a non-unit weight doesn't itself brighten or dim the pixel.
        let gain = if meta.gain > 0.0 { meta.gain } else { 1.0 };
        let contribution = if meta.weight > 0.0 { meta.weight } else { 1.0 };
        let (cw, ch) = (self.canvas.width() as i64, self.canvas.height() as i64);
        for ty in 0..tile.height() {
            let oy = dest_y + ty as i64;
            if oy < 0 || oy >= ch {
                continue;
            }
            for tx in 0..tile.width() {
                let ox = dest_x + tx as i64;
                if ox < 0 || ox >= cw {
                    continue;
                }
                let idx = (oy as usize) * (self.canvas.width() as usize) + ox as usize;
                let existing_weight = self.weights[idx];
                let new_weight = existing_weight + contribution;
                let src = tile.get_pixel(tx, ty).0;
                let dst = self.canvas.get_pixel(ox as u32, oy as u32).0;
                let blended = if new_weight > 0.0 {
                    let mut out = [0u8; 3];
                    for c in 0..3 {
                        let corrected = (src[c] as f32 * gain).clamp(0.0, 255.0);
                        let mixed = (dst[c] as f32 * existing_weight
                            + corrected * contribution)
                            / new_weight;
                        out[c] = mixed.round().clamp(0.0, 255.0) as u8;
                    }
                    out
                } else {
                    src
                };
                self.canvas.put_pixel(ox as u32, oy as u32, Rgb(blended));
                self.weights[idx] = new_weight;
            }
        }
    }

    pub fn finalize(self) -> RgbImage {
        self.canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_places_tile_at_offset() {
        let mut writer = TileWriter::new(4, 4, WriteStrategy::Overwrite, Rgb([0, 0, 0]));
        let mut tile = RgbImage::new(2, 2);
        for px in tile.pixels_mut() {
            *px = Rgb([255, 255, 255]);
        }
        writer.write_tile(&tile, 1, 1, BlendMetadata::default());
        let canvas = writer.finalize();
        assert_eq!(*canvas.get_pixel(1, 1), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn weighted_blend_averages_overlap() {
        let mut writer =
            TileWriter::new(2, 2, WriteStrategy::WeightedBlend, Rgb([0, 0, 0]));
        let mut tile_a = RgbImage::new(2, 2);
        for px in tile_a.pixels_mut() {
            *px = Rgb([100, 0, 0]);
        }
        let mut tile_b = RgbImage::new(2, 2);
        for px in tile_b.pixels_mut() {
            *px = Rgb([200, 0, 0]);
        }
        writer.write_tile(&tile_a, 0, 0, BlendMetadata { gain: 1.0, ..Default::default() });
        writer.write_tile(&tile_b, 0, 0, BlendMetadata { gain: 1.0, ..Default::default() });
        let canvas = writer.finalize();
        assert_eq!(canvas.get_pixel(0, 0).0[0], 150);
    }

    #[test]
    fn gain_corrects_pixel_value_independent_of_weight() {
        // A single non-overlapping write with gain=2.0 should double the
        // pixel value, not get diluted by folding gain into the weight.
        let mut writer =
            TileWriter::new(1, 1, WriteStrategy::WeightedBlend, Rgb([0, 0, 0]));
        let mut tile = RgbImage::new(1, 1);
        *tile.get_pixel_mut(0, 0) = Rgb([50, 50, 50]);
        writer.write_tile(&tile, 0, 0, BlendMetadata { gain: 2.0, ..Default::default() });
        let canvas = writer.finalize();
        assert_eq!(canvas.get_pixel(0, 0).0[0], 100);
    }

    #[test]
    fn unequal_weights_favor_the_heavier_contribution() {
        let mut writer =
            TileWriter::new(1, 1, WriteStrategy::WeightedBlend, Rgb([0, 0, 0]));
        let mut tile_a = RgbImage::new(1, 1);
        *tile_a.get_pixel_mut(0, 0) = Rgb([0, 0, 0]);
        let mut tile_b = RgbImage::new(1, 1);
        *tile_b.get_pixel_mut(0, 0) = Rgb([100, 100, 100]);
        writer.write_tile(&tile_a, 0, 0, BlendMetadata { weight: 3.0, ..Default::default() });
        writer.write_tile(&tile_b, 0, 0, BlendMetadata { weight: 1.0, ..Default::default() });
        let canvas = writer.finalize();
        // (0*3 + 100*1) / 4 = 25
        assert_eq!(canvas.get_pixel(0, 0).0[0], 25);
    }

    #[test]
    fn clips_tiles_outside_canvas() {
        let mut writer = TileWriter::new(2, 2, WriteStrategy::Overwrite, Rgb([9, 9, 9]));
        let tile = RgbImage::new(2, 2);
        writer.write_tile(&tile, 10, 10, BlendMetadata::default());
        let canvas = writer.finalize();
        assert_eq!(*canvas.get_pixel(0, 0), Rgb([9, 9, 9]));
    }
}
