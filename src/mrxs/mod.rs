//! 3DHISTECH MRXS parsing: `Slidedat.ini` and `Index.dat` readers, the
//! per-level tile spatial index, and a [`slide::SlideReader`](crate::slide::SlideReader)
//! implementation over the camera-tile pyramid they describe.

mod constants;
mod data;
mod geometry;
mod index;
mod ini;
mod plan;
mod reader;
mod spatial_index;
mod types;

pub use data::MrxsDataFiles;
pub use geometry::{classify_position_layer, Box2D};
pub use index::{MrxsIndexReader, NonHierRecordData};
pub use ini::{parse_slide_data_info, IniFile};
pub use plan::plan_ops_for_level;
pub use reader::{MrxsMetadata, MrxsReader};
pub use spatial_index::MrxsSpatialIndex;
pub use types::{
    MiraxTileRecord, MrxsImageFormat, NonHierarchicalLayer, NonHierarchicalRecord,
    PyramidLevelParameters, SlideDataInfo, SlideZoomLevel,
};
