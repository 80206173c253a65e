//! Pyramidal TIFF parsing: classic/BigTIFF headers, IFDs, pyramid level
//! identification, tag value decoding, and an Aperio SVS-flavored
//! [`slide::SlideReader`](crate::slide::SlideReader) implementation on top.

mod handle;
mod header;
mod ifd;
mod pyramid;
mod reader;
mod tags;
mod values;

pub use handle::TiffHandle;
pub use header::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use ifd::{Ifd, IfdEntry};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use reader::{SvsMetadata, SvsReader};
pub use tags::{Compression, FieldType, TiffTag, QUICKHASH_TAGS};
pub use values::{parse_u32_array, parse_u64_array, ValueReader};
