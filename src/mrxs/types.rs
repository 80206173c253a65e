//! Slide-wide MRXS metadata: zoom levels, pyramid level parameters, tile
//! records, and non-hierarchical (associated data) layers.

/// Compressed stored-image format, as declared per zoom level in Slidedat.ini.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrxsImageFormat {
    Jpeg,
    Png,
    Bmp,
}

/// One logical tile: where its compressed bytes live, its grid position, and
/// the intensity-gain correction for the camera position that produced it.
#[derive(Debug, Clone, Copy)]
pub struct MiraxTileRecord {
    pub image_index: i64,
    pub offset: i64,
    pub length: i64,
    pub data_file_number: i64,
    pub x: i32,
    pub y: i32,
    pub subregion_x: f64,
    pub subregion_y: f64,
    pub gain: f32,
}

/// Per-level metadata read straight out of Slidedat.ini.
#[derive(Debug, Clone)]
pub struct SlideZoomLevel {
    pub downsample_exponent: i32,
    pub x_overlap_pixels: f64,
    pub y_overlap_pixels: f64,
    pub mpp_x: f64,
    pub mpp_y: f64,
    pub background_color_rgb: u32,
    pub image_format: MrxsImageFormat,
    pub image_width: i32,
    pub image_height: i32,
    pub section_name: String,
}

/// Derived layout parameters for one pyramid level: how stored images are
/// concatenated and subdivided, and the pixel spacing between tile centers.
#[derive(Debug, Clone, Copy)]
pub struct PyramidLevelParameters {
    pub concatenation_factor: i32,
    pub grid_divisor: i32,
    pub subtiles_per_stored_image: i32,
    pub camera_positions_per_tile: i32,
    pub horizontal_tile_step: f64,
    pub vertical_tile_step: f64,
}

/// One non-hierarchical (associated data) record: a named item living
/// somewhere in the non-hierarchical section of Index.dat.
#[derive(Debug, Clone, Default)]
pub struct NonHierarchicalRecord {
    pub layer_name: String,
    pub value_name: String,
    pub section_name: String,
    pub record_index: usize,
    pub layer_index: usize,
}

/// A group of non-hierarchical records sharing a layer name (e.g. all the
/// slide-preview records, or all position-buffer records).
#[derive(Debug, Clone, Default)]
pub struct NonHierarchicalLayer {
    pub name: String,
    pub count: usize,
    pub record_offset: usize,
    pub records: Vec<NonHierarchicalRecord>,
}

/// Everything parsed out of Slidedat.ini plus camera-position data read from
/// the index file, sufficient to drive tile lookups and region reads.
#[derive(Debug, Clone, Default)]
pub struct SlideDataInfo {
    pub slide_id: String,
    pub images_x: i32,
    pub images_y: i32,
    pub objective_magnification: i32,
    pub image_divisions: i32,
    pub datafile_paths: Vec<String>,
    pub zoom_levels: Vec<SlideZoomLevel>,
    pub index_filename: String,

    /// Flattened (x, y) pairs, level-0 pixel coordinates, one pair per camera
    /// position. Empty when `using_synthetic_positions` is true.
    pub camera_positions: Vec<(i32, i32)>,
    pub using_synthetic_positions: bool,

    pub position_layer_record_offset: Option<usize>,
    pub position_layer_compressed: bool,

    /// One gain value per camera position, in `camera_positions` order.
    /// Empty for slides predating per-position intensity correction.
    pub camera_position_gains: Vec<f32>,

    pub nonhier_layers: Vec<NonHierarchicalLayer>,
}

impl SlideDataInfo {
    pub fn level_params(&self) -> Vec<PyramidLevelParameters> {
        let mut params = Vec::with_capacity(self.zoom_levels.len());
        let mut accumulated_exponent = 0i32;

        for zoom_level in &self.zoom_levels {
            accumulated_exponent += zoom_level.downsample_exponent;
            let concatenation_factor = 1i32 << accumulated_exponent;

            let camera_positions_per_image =
                (concatenation_factor / self.image_divisions.max(1)).max(1);
            let grid_divisor = concatenation_factor.min(self.image_divisions.max(1));
            let subtiles_per_stored_image = camera_positions_per_image;

            let logical_tile_width = zoom_level.image_width as f64 / subtiles_per_stored_image as f64;
            let logical_tile_height = zoom_level.image_height as f64 / subtiles_per_stored_image as f64;

            let images_per_camera_position =
                (self.image_divisions.max(1) / concatenation_factor).max(1);

            let horizontal_tile_step = logical_tile_width
                - (zoom_level.x_overlap_pixels / images_per_camera_position as f64);
            let vertical_tile_step = logical_tile_height
                - (zoom_level.y_overlap_pixels / images_per_camera_position as f64);

            params.push(PyramidLevelParameters {
                concatenation_factor,
                grid_divisor,
                subtiles_per_stored_image,
                camera_positions_per_tile: 1,
                horizontal_tile_step,
                vertical_tile_step,
            });
        }

        params
    }
}
