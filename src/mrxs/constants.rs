//! Fixed constants of the MRXS on-disk format.

/// Maximum plausible size of one compressed tile; guards against reading a
/// corrupt length field as a multi-gigabyte allocation.
pub const MAX_TILE_SIZE: i64 = 100 * 1024 * 1024;

/// Version string `Index.dat` must begin with.
pub const INDEX_VERSION: &str = "01.02";
pub const INDEX_VERSION_SIZE: usize = 5;

/// Bytes per camera position in the position buffer: 1 flag byte + 4-byte LE
/// x + 4-byte LE y.
pub const POSITION_RECORD_SIZE: usize = 9;

/// Layer names that carry camera position data, in the order MRXS versions
/// introduced them.
pub const POSITION_LAYER_UNCOMPRESSED: &str = "VIMSLIDE_POSITION_BUFFER";
pub const POSITION_LAYER_COMPRESSED: &str = "StitchingIntensityLayer";

/// `Slidedat.ini` section names.
pub const SECTION_GENERAL: &str = "GENERAL";
pub const SECTION_HIERARCHICAL: &str = "HIERARCHICAL";
pub const SECTION_DATAFILE: &str = "DATAFILE";

/// The `HIER_*_NAME` value marking the zoom-level pyramid among the other
/// (non-tile) hierarchical layers a Slidedat.ini may declare.
pub const SLIDE_ZOOM_LEVEL_NAME: &str = "Slide zoom level";

/// Default intensity-fill color (opaque white, BGR-packed) used when a zoom
/// level section omits `IMAGE_FILL_COLOR_BGR`.
pub const DEFAULT_FILL_COLOR_BGR: u32 = 0xFFFFFFFF;
