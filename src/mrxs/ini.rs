//! `Slidedat.ini` parser.
//!
//! MRXS metadata lives in a Windows-style INI file: `[SECTION]` headers and
//! `KEY=VALUE` pairs, one per line, with `;`/`#` comments and an optional
//! UTF-8 BOM on the very first line. Keys and values are trimmed
//! asymmetrically (key: trailing only, value: leading only) to match what
//! real Slidedat.ini files in the wild rely on.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{IniError, MrxsError, Result};
use crate::io::read_to_vec;

use super::constants::{
    DEFAULT_FILL_COLOR_BGR, SECTION_DATAFILE, SECTION_GENERAL, SECTION_HIERARCHICAL, SLIDE_ZOOM_LEVEL_NAME,
};
use super::types::{MrxsImageFormat, NonHierarchicalLayer, NonHierarchicalRecord, SlideDataInfo, SlideZoomLevel};

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A parsed Slidedat.ini: section -> key -> value.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = read_to_vec(path)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(Self::parse(&text))
    }

    fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        sections.entry(current.clone()).or_default();

        for (i, raw_line) in text.lines().enumerate() {
            let line = if i == 0 {
                raw_line.strip_prefix(std::str::from_utf8(BOM).unwrap()).unwrap_or(raw_line)
            } else {
                raw_line
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = name.trim().to_string();
                sections.entry(current.clone()).or_default();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim_end().to_string();
                let value = value.trim_start().to_string();
                sections.entry(current.clone()).or_default().insert(key, value);
            }
        }

        IniFile { sections }
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn get_string(&self, section: &str, key: &str) -> Result<String> {
        let entries = self
            .sections
            .get(section)
            .ok_or_else(|| IniError::MissingSection(section.to_string()))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| IniError::MissingKey { section: section.to_string(), key: key.to_string() }.into())
    }

    pub fn get_int(&self, section: &str, key: &str) -> Result<i64> {
        let raw = self.get_string(section, key)?;
        raw.trim().parse::<i64>().map_err(|e| {
            IniError::InvalidValue { key: key.to_string(), message: e.to_string() }.into()
        })
    }

    pub fn get_double(&self, section: &str, key: &str) -> Result<f64> {
        let raw = self.get_string(section, key)?;
        raw.trim().parse::<f64>().map_err(|e| {
            IniError::InvalidValue { key: key.to_string(), message: e.to_string() }.into()
        })
    }

    fn get_int_or(&self, section: &str, key: &str, default: i64) -> Result<i64> {
        match self.get_int(section, key) {
            Ok(v) => Ok(v),
            Err(e) if matches!(e.kind(), crate::error::ErrorKind::NotFound) => Ok(default),
            Err(e) => Err(e),
        }
    }
}

fn parse_image_format(raw: &str) -> Result<MrxsImageFormat> {
    let upper = raw.to_ascii_uppercase();
    if upper.contains("JPEG") || upper.contains("JPG") {
        Ok(MrxsImageFormat::Jpeg)
    } else if upper.contains("PNG") {
        Ok(MrxsImageFormat::Png)
    } else if upper.contains("BMP") {
        Ok(MrxsImageFormat::Bmp)
    } else {
        Err(MrxsError::InvalidRecord(format!("unsupported IMAGE_FORMAT: {raw:?}")).into())
    }
}

/// Reads the `HIERARCHICAL` section's "Slide zoom level" layer: one
/// [`SlideZoomLevel`] per pyramid level, in level-0-first order.
fn parse_tiled_layers(ini: &IniFile) -> Result<(String, Vec<SlideZoomLevel>)> {
    if !ini.has_section(SECTION_HIERARCHICAL) {
        return Err(MrxsError::InvalidRecord("missing [HIERARCHICAL] section".to_string()).into());
    }

    let index_filename = ini.get_string(SECTION_HIERARCHICAL, "INDEXFILE")?;
    let hier_count = ini.get_int(SECTION_HIERARCHICAL, "HIER_COUNT")?;

    let mut slide_zoom_level_index = None;
    for i in 0..hier_count {
        let name = ini.get_string(SECTION_HIERARCHICAL, &format!("HIER_{i}_NAME"))?;
        if name == SLIDE_ZOOM_LEVEL_NAME {
            slide_zoom_level_index = Some(i);
            break;
        }
    }
    let idx = slide_zoom_level_index
        .ok_or_else(|| MrxsError::InvalidRecord("no \"Slide zoom level\" hierarchical layer found".to_string()))?;

    let level_count = ini.get_int(SECTION_HIERARCHICAL, &format!("HIER_{idx}_COUNT"))?;

    let mut zoom_levels = Vec::with_capacity(level_count as usize);
    for j in 0..level_count {
        let section_key = format!("HIER_{idx}_VAL_{j}_SECTION");
        let Ok(section_name) = ini.get_string(SECTION_HIERARCHICAL, &section_key) else {
            continue;
        };
        if !ini.has_section(&section_name) {
            continue;
        }

        let x_overlap_pixels = ini.get_double(&section_name, "OVERLAP_X")?;
        let y_overlap_pixels = ini.get_double(&section_name, "OVERLAP_Y")?;
        let mpp_x = ini.get_double(&section_name, "MICROMETER_PER_PIXEL_X")?;
        let mpp_y = ini.get_double(&section_name, "MICROMETER_PER_PIXEL_Y")?;
        let image_format = parse_image_format(&ini.get_string(&section_name, "IMAGE_FORMAT")?)?;
        let background_color_rgb =
            ini.get_int_or(&section_name, "IMAGE_FILL_COLOR_BGR", DEFAULT_FILL_COLOR_BGR as i64)? as u32;
        let image_width = ini.get_int(&section_name, "DIGITIZER_WIDTH")? as i32;
        let image_height = ini.get_int(&section_name, "DIGITIZER_HEIGHT")? as i32;
        let downsample_exponent = ini.get_int_or(&section_name, "IMAGE_CONCAT_FACTOR", 0)? as i32;

        zoom_levels.push(SlideZoomLevel {
            downsample_exponent,
            x_overlap_pixels,
            y_overlap_pixels,
            mpp_x,
            mpp_y,
            background_color_rgb,
            image_format,
            image_width,
            image_height,
            section_name,
        });
    }

    if zoom_levels.is_empty() {
        return Err(MrxsError::InvalidRecord("slide zoom level layer has no usable levels".to_string()).into());
    }

    Ok((index_filename, zoom_levels))
}

/// Reads every `NONHIER_*` layer declaration, locating the camera-position
/// buffer layer if one exists. `NONHIER_COUNT` itself is optional: its
/// absence means this slide carries no non-hierarchical data at all, and
/// tile placement must fall back to the synthetic grid.
fn parse_non_tiled_layers(
    ini: &IniFile,
) -> Result<(Vec<NonHierarchicalLayer>, Option<usize>, bool)> {
    let Ok(nonhier_count) = ini.get_int(SECTION_GENERAL, "NONHIER_COUNT") else {
        return Ok((Vec::new(), None, true));
    };

    let mut layers = Vec::with_capacity(nonhier_count as usize);
    let mut record_offset = 0usize;
    let mut position_layer_record_offset = None;

    for i in 0..nonhier_count {
        let name = ini.get_string(SECTION_GENERAL, &format!("NONHIER_{i}_NAME"))?;
        let count = ini.get_int(SECTION_GENERAL, &format!("NONHIER_{i}_COUNT"))? as usize;

        let mut records = Vec::with_capacity(count);
        for j in 0..count {
            let value_name = ini
                .get_string(SECTION_GENERAL, &format!("NONHIER_{i}_VAL_{j}"))
                .unwrap_or_default();
            let section_name = ini
                .get_string(SECTION_GENERAL, &format!("NONHIER_{i}_VAL_{j}_SECTION"))
                .unwrap_or_default();
            records.push(NonHierarchicalRecord {
                layer_name: name.clone(),
                value_name,
                section_name,
                record_index: record_offset + j,
                layer_index: i as usize,
            });
        }

        if super::geometry::classify_position_layer(&name).is_some() {
            position_layer_record_offset = Some(record_offset);
        }

        layers.push(NonHierarchicalLayer { name, count, record_offset, records });
        record_offset += count;
    }

    let using_synthetic_positions = position_layer_record_offset.is_none();
    Ok((layers, position_layer_record_offset, using_synthetic_positions))
}

/// Assembles a full [`SlideDataInfo`] from a parsed Slidedat.ini: `GENERAL`,
/// `HIERARCHICAL` (tiled pyramid levels), `DATAFILE`, and `NONHIER_*`
/// (associated data and, where present, camera positions).
pub fn parse_slide_data_info(ini: &IniFile) -> Result<SlideDataInfo> {
    if !ini.has_section(SECTION_GENERAL) {
        return Err(MrxsError::InvalidRecord("missing [GENERAL] section".to_string()).into());
    }

    let slide_id = ini.get_string(SECTION_GENERAL, "SLIDE_ID")?;
    let images_x = ini.get_int(SECTION_GENERAL, "IMAGENUMBER_X")? as i32;
    let images_y = ini.get_int(SECTION_GENERAL, "IMAGENUMBER_Y")? as i32;
    let objective_magnification = ini.get_int(SECTION_GENERAL, "OBJECTIVE_MAGNIFICATION")? as i32;
    let image_divisions = ini.get_int_or(SECTION_GENERAL, "CameraImageDivisionsPerSide", 1)? as i32;

    let (index_filename, zoom_levels) = parse_tiled_layers(ini)?;
    let (nonhier_layers, position_layer_record_offset, using_synthetic_positions) =
        parse_non_tiled_layers(ini)?;

    let position_layer_compressed = position_layer_record_offset
        .and_then(|offset| {
            nonhier_layers
                .iter()
                .find(|l| l.record_offset == offset)
                .and_then(|l| super::geometry::classify_position_layer(&l.name))
        })
        .unwrap_or(false);

    if !ini.has_section(SECTION_DATAFILE) {
        return Err(MrxsError::InvalidRecord("missing [DATAFILE] section".to_string()).into());
    }
    let file_count = ini.get_int(SECTION_DATAFILE, "FILE_COUNT")?;
    let mut datafile_paths = Vec::with_capacity(file_count as usize);
    for i in 0..file_count {
        datafile_paths.push(ini.get_string(SECTION_DATAFILE, &format!("FILE_{i}"))?);
    }

    Ok(SlideDataInfo {
        slide_id,
        images_x,
        images_y,
        objective_magnification,
        image_divisions,
        datafile_paths,
        zoom_levels,
        index_filename,
        camera_positions: Vec::new(),
        using_synthetic_positions,
        position_layer_record_offset,
        position_layer_compressed,
        camera_position_gains: Vec::new(),
        nonhier_layers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_keys() {
        let ini = IniFile::parse("[GENERAL]\nSLIDE_ID=abc-123\nIMAGENUMBER_X=10\n");
        assert!(ini.has_section("GENERAL"));
        assert_eq!(ini.get_string("GENERAL", "SLIDE_ID").unwrap(), "abc-123");
        assert_eq!(ini.get_int("GENERAL", "IMAGENUMBER_X").unwrap(), 10);
    }

    #[test]
    fn strips_bom_only_on_first_line() {
        let mut text = String::from_utf8(BOM.to_vec()).unwrap();
        text.push_str("[GENERAL]\nA=1\n");
        let ini = IniFile::parse(&text);
        assert!(ini.has_section("GENERAL"));
        assert_eq!(ini.get_string("GENERAL", "A").unwrap(), "1");
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let ini = IniFile::parse("; comment\n\n# also comment\n[S]\nK=V\n");
        assert_eq!(ini.get_string("S", "K").unwrap(), "V");
    }

    #[test]
    fn trims_key_trailing_and_value_leading_whitespace_around_equals() {
        let ini = IniFile::parse("[S]\nKEY \t=\t value\n");
        let entries = ini.sections.get("S").unwrap();
        assert_eq!(entries.get("KEY").unwrap(), "value");
    }

    #[test]
    fn missing_section_and_key_errors() {
        let ini = IniFile::parse("[S]\nK=V\n");
        assert!(ini.get_string("OTHER", "K").is_err());
        assert!(ini.get_string("S", "MISSING").is_err());
    }

    #[test]
    fn invalid_int_errors() {
        let ini = IniFile::parse("[S]\nK=not-a-number\n");
        assert!(ini.get_int("S", "K").is_err());
    }

    fn minimal_slidedat() -> String {
        "[GENERAL]\n\
         SLIDE_ID=abcd-1234\n\
         IMAGENUMBER_X=2\n\
         IMAGENUMBER_Y=2\n\
         OBJECTIVE_MAGNIFICATION=20\n\
         [HIERARCHICAL]\n\
         INDEXFILE=Index.dat\n\
         HIER_COUNT=1\n\
         HIER_0_NAME=Slide zoom level\n\
         HIER_0_COUNT=1\n\
         HIER_0_VAL_0_SECTION=LAYER_0_LEVEL_0\n\
         [LAYER_0_LEVEL_0]\n\
         OVERLAP_X=0\n\
         OVERLAP_Y=0\n\
         MICROMETER_PER_PIXEL_X=0.25\n\
         MICROMETER_PER_PIXEL_Y=0.25\n\
         IMAGE_FORMAT=JPEG\n\
         DIGITIZER_WIDTH=256\n\
         DIGITIZER_HEIGHT=256\n\
         [DATAFILE]\n\
         FILE_COUNT=1\n\
         FILE_0=Data0000.dat\n"
            .to_string()
    }

    #[test]
    fn parses_minimal_slide_data_info_without_nonhier() {
        let ini = IniFile::parse(&minimal_slidedat());
        let info = parse_slide_data_info(&ini).unwrap();
        assert_eq!(info.slide_id, "abcd-1234");
        assert_eq!(info.images_x, 2);
        assert_eq!(info.image_divisions, 1);
        assert_eq!(info.zoom_levels.len(), 1);
        assert_eq!(info.zoom_levels[0].image_format, MrxsImageFormat::Jpeg);
        assert!(info.using_synthetic_positions);
        assert_eq!(info.datafile_paths, vec!["Data0000.dat".to_string()]);
    }

    #[test]
    fn finds_position_buffer_layer_among_nonhier_layers() {
        let text = minimal_slidedat().replacen(
            "[HIERARCHICAL]",
            "NONHIER_COUNT=1\nNONHIER_0_NAME=VIMSLIDE_POSITION_BUFFER\nNONHIER_0_COUNT=1\n[HIERARCHICAL]",
            1,
        );
        let ini = IniFile::parse(&text);
        let info = parse_slide_data_info(&ini).unwrap();
        assert!(!info.using_synthetic_positions);
        assert_eq!(info.position_layer_record_offset, Some(0));
        assert!(!info.position_layer_compressed);
    }

    #[test]
    fn missing_hierarchical_section_errors() {
        let ini = IniFile::parse("[GENERAL]\nSLIDE_ID=x\nIMAGENUMBER_X=1\nIMAGENUMBER_Y=1\nOBJECTIVE_MAGNIFICATION=20\n");
        assert!(parse_slide_data_info(&ini).is_err());
    }

    #[test]
    fn parse_image_format_recognizes_known_variants() {
        assert_eq!(parse_image_format("JPEG").unwrap(), MrxsImageFormat::Jpeg);
        assert_eq!(parse_image_format("png").unwrap(), MrxsImageFormat::Png);
        assert!(parse_image_format("TIFF").is_err());
    }
}
