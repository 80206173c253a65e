pub mod jpeg;
mod raster;

pub use raster::{decode_to_rgb8, sniff_format, DecodedImage, SourceFormat};
