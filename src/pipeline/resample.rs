//! Subpixel resampling for tiles read at a non-integer downsample.
//!
//! Bilinear is used rather than a sharper kernel (e.g. Magic Kernel): it is
//! the cheap, well-understood default and this crate does not need
//! publication-quality resampling, only a resample that does not alias
//! badly at the downsample ratios pyramid levels actually present (powers
//! of two, read at the nearest level and then fine-adjusted by a fraction).

use image::{Rgb, RgbImage};

pub fn resize_bilinear(src: &RgbImage, dst_width: u32, dst_height: u32) -> RgbImage {
    if src.width() == dst_width && src.height() == dst_height {
        return src.clone();
    }
    let mut dst = RgbImage::new(dst_width, dst_height);
    if dst_width == 0 || dst_height == 0 || src.width() == 0 || src.height() == 0 {
        return dst;
    }
    let x_ratio = src.width() as f64 / dst_width as f64;
    let y_ratio = src.height() as f64 / dst_height as f64;

    for dy in 0..dst_height {
        let sy = (dy as f64 + 0.5) * y_ratio - 0.5;
        let sy0 = sy.floor();
        let fy = (sy - sy0) as f32;
        let y0 = sy0.clamp(0.0, (src.height() - 1) as f64) as u32;
        let y1 = (y0 + 1).min(src.height() - 1);

        for dx in 0..dst_width {
            let sx = (dx as f64 + 0.5) * x_ratio - 0.5;
            let sx0 = sx.floor();
            let fx = (sx - sx0) as f32;
            let x0 = sx0.clamp(0.0, (src.width() - 1) as f64) as u32;
            let x1 = (x0 + 1).min(src.width() - 1);

            let p00 = src.get_pixel(x0, y0).0;
            let p10 = src.get_pixel(x1, y0).0;
            let p01 = src.get_pixel(x0, y1).0;
            let p11 = src.get_pixel(x1, y1).0;

            let mut out = [0u8; 3];
            for c in 0..3 {
                let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
                let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
                let v = top * (1.0 - fy) + bottom * fy;
                out[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            dst.put_pixel(dx, dy, Rgb(out));
        }
    }
    dst
}

/// Shifts `src` by a sub-pixel `(frac_x, frac_y)` offset using the same
/// bilinear weights as [`resize_bilinear`], keeping the source's dimensions.
/// Used to align an MRXS stored image whose measured camera position didn't
/// land on an integer output pixel before it's blended in.
pub fn shift_bilinear(src: &RgbImage, frac_x: f64, frac_y: f64) -> RgbImage {
    let (w, h) = (src.width(), src.height());
    let mut dst = RgbImage::new(w, h);
    if w == 0 || h == 0 {
        return dst;
    }

    let x_floor = frac_x.floor() as i64;
    let y_floor = frac_y.floor() as i64;
    let tx = (frac_x - frac_x.floor()) as f32;
    let ty = (frac_y - frac_y.floor()) as f32;

    for y in 0..h {
        let sy0 = (y as i64 + y_floor).clamp(0, h as i64 - 1) as u32;
        let sy1 = (y as i64 + y_floor + 1).clamp(0, h as i64 - 1) as u32;
        for x in 0..w {
            let sx0 = (x as i64 + x_floor).clamp(0, w as i64 - 1) as u32;
            let sx1 = (x as i64 + x_floor + 1).clamp(0, w as i64 - 1) as u32;

            let p00 = src.get_pixel(sx0, sy0).0;
            let p10 = src.get_pixel(sx1, sy0).0;
            let p01 = src.get_pixel(sx0, sy1).0;
            let p11 = src.get_pixel(sx1, sy1).0;

            let mut out = [0u8; 3];
            for c in 0..3 {
                let top = p00[c] as f32 * (1.0 - tx) + p10[c] as f32 * tx;
                let bottom = p01[c] as f32 * (1.0 - tx) + p11[c] as f32 * tx;
                let v = top * (1.0 - ty) + bottom * ty;
                out[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            dst.put_pixel(x, y, Rgb(out));
        }
    }
    dst
}
