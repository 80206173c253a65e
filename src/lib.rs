//! # wsi-reader
//!
//! A random-access reader for multi-resolution whole-slide image pyramids.
//!
//! Whole-slide images (WSI) are gigapixel micrographs stored as an image
//! pyramid: one full-resolution level plus a series of progressively
//! downsampled levels, tiled so that a viewer can fetch just the tiles a
//! requested region actually overlaps instead of decoding the whole file.
//! This crate reads that pyramid directly off local disk with range reads
//! and parallel tile decoding, without re-encoding the slide or shelling out
//! to a native library.
//!
//! ## Formats
//!
//! - [`tiff`] - Aperio SVS and generic pyramidal (Big)TIFF
//! - [`mrxs`] - 3DHISTECH MRXS (a `.mrxs` stub plus a sibling data directory)
//!
//! Both implement the common [`slide::SlideReader`] trait, so callers that
//! don't need format-specific metadata can go through [`registry::ReaderRegistry`]
//! and stay format-agnostic.
//!
//! ## Architecture
//!
//! - [`error`] - the crate-wide [`error::Error`] type and per-format error enums
//! - [`io`] - pooled file handles, range reads, and streaming quickhash
//! - [`pool`] - the generic bounded handle pool both formats build on
//! - [`codec`] - JPEG/PNG/BMP tile decoding to RGB8
//! - [`cache`] - process-wide decoded-tile LRU cache
//! - [`pipeline`] - region planning, tile blending, and the output image type
//! - [`slide`] - the format-independent [`slide::SlideReader`] contract
//! - [`registry`] - extension-keyed dispatch across formats
//! - [`config`] - tunables for the cache, handle pool, and tile executor
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_reader::{RegionSpec, SlideReader, SvsReader};
//!
//! let slide = SvsReader::open("sample.svs")?;
//! let region = RegionSpec { level: 0, x: 0, y: 0, width: 512, height: 512 };
//! let image = slide.read_region(region)?;
//! println!("{}x{}", image.width, image.height);
//! # Ok::<(), wsi_reader::Error>(())
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod mrxs;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod slide;
pub mod tiff;

pub use cache::{CacheStats, CachedTile, TileCache, TileKey};
pub use codec::{decode_to_rgb8, sniff_format, DecodedImage, SourceFormat};
pub use config::{CacheConfig, ExecutorConfig, PoolConfig};
pub use error::{Error, ErrorKind, MrxsError, Result, TiffError};
pub use mrxs::{MrxsMetadata, MrxsReader};
pub use pipeline::{
    BlendMetadata, BlendMode, ExecutionStats, Image, LevelInfo, PlanCost, RegionSpec, SlideProperties,
    TilePlan, TileReadOp,
};
pub use pool::{HandlePool, PoolGuard};
pub use registry::{default_registry, Capabilities, FormatDescriptor, ReaderRegistry};
pub use slide::SlideReader;
pub use tiff::{SvsMetadata, SvsReader};
