//! Extension-keyed dispatch from a file path to the right format plugin.
//!
//! Each supported format registers a [`FormatDescriptor`] naming its primary
//! extension and any aliases; opening a path normalizes its extension
//! (lowercased, no leading dot) and looks up the matching descriptor's
//! factory. There is no magic-byte sniffing — MRXS slides are directories,
//! not files with a byte signature to sniff, so extension dispatch is the
//! only mechanism that works uniformly across both formats.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, ErrorKind, Result};
use crate::slide::SlideReader;

/// Format capability flags, used by callers that want to branch on what a
/// format supports before opening it (e.g. skipping associated-image
/// extraction for formats that don't have any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pyramid: bool,
    pub associated_images: bool,
    pub quickhash: bool,
    pub overlapping_tiles: bool,
    pub multi_channel: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            pyramid: true,
            associated_images: false,
            quickhash: true,
            overlapping_tiles: false,
            multi_channel: false,
        }
    }
}

pub type ReaderFactory = Arc<dyn Fn(&Path) -> Result<Box<dyn SlideReader>> + Send + Sync>;

#[derive(Clone)]
pub struct FormatDescriptor {
    pub primary_extension: &'static str,
    pub aliases: &'static [&'static str],
    pub format_name: &'static str,
    pub capabilities: Capabilities,
    pub factory: ReaderFactory,
}

/// Registry mapping normalized extensions to [`FormatDescriptor`]s.
pub struct ReaderRegistry {
    by_extension: RwLock<HashMap<String, FormatDescriptor>>,
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry {
            by_extension: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, descriptor: FormatDescriptor) {
        let mut map = self.by_extension.write();
        map.insert(normalize_extension(descriptor.primary_extension), descriptor.clone());
        for alias in descriptor.aliases {
            map.insert(normalize_extension(alias), descriptor.clone());
        }
    }

    pub fn descriptor_for(&self, extension: &str) -> Option<FormatDescriptor> {
        self.by_extension.read().get(&normalize_extension(extension)).cloned()
    }

    /// Opens `path`, dispatching on its extension (or, for MRXS, the
    /// `.mrxs` extension of the slide's companion file even though the
    /// slide data itself lives in a sibling directory).
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Box<dyn SlideReader>> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, format!("no extension on {}", path.display())))?;
        let descriptor = self.descriptor_for(ext).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("no reader registered for extension .{ext}"))
        })?;
        (descriptor.factory)(path)
    }

    pub fn registered_formats(&self) -> Vec<&'static str> {
        let map = self.by_extension.read();
        let mut names: Vec<&'static str> = map.values().map(|d| d.format_name).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Normalized extensions (e.g. `"svs"`, `"tif"`) this registry dispatches,
    /// sorted and deduplicated.
    pub fn registered_extensions(&self) -> Vec<String> {
        let map = self.by_extension.read();
        let mut exts: Vec<String> = map.keys().cloned().collect();
        exts.sort_unstable();
        exts
    }

    /// Format names whose capabilities satisfy `predicate`, e.g.
    /// `formats_with_capability(|c| c.overlapping_tiles)`.
    pub fn formats_with_capability(&self, predicate: impl Fn(&Capabilities) -> bool) -> Vec<&'static str> {
        let map = self.by_extension.read();
        let mut names: Vec<&'static str> =
            map.values().filter(|d| predicate(&d.capabilities)).map(|d| d.format_name).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A registry with the TIFF/Aperio SVS and 3DHISTECH MRXS readers already
/// registered under their usual extensions.
pub fn default_registry() -> ReaderRegistry {
    let registry = ReaderRegistry::new();

    registry.register(FormatDescriptor {
        primary_extension: "svs",
        aliases: &["tif", "tiff"],
        format_name: "aperio-svs",
        capabilities: Capabilities {
            pyramid: true,
            associated_images: false,
            quickhash: true,
            overlapping_tiles: false,
            multi_channel: false,
        },
        factory: Arc::new(|path| {
            crate::tiff::SvsReader::open(path).map(|r| Box::new(r) as Box<dyn SlideReader>)
        }),
    });

    registry.register(FormatDescriptor {
        primary_extension: "mrxs",
        aliases: &[],
        format_name: "3dhistech-mrxs",
        capabilities: Capabilities {
            pyramid: true,
            associated_images: false,
            quickhash: true,
            overlapping_tiles: true,
            multi_channel: false,
        },
        factory: Arc::new(|path| {
            crate::mrxs::MrxsReader::open(path).map(|r| Box::new(r) as Box<dyn SlideReader>)
        }),
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_descriptor() -> FormatDescriptor {
        FormatDescriptor {
            primary_extension: "svs",
            aliases: &["tif", "tiff"],
            format_name: "aperio-svs",
            capabilities: Capabilities::default(),
            factory: Arc::new(|_path| {
                Err(Error::new(ErrorKind::Unimplemented, "test factory"))
            }),
        }
    }

    #[test]
    fn lookup_is_case_and_dot_insensitive() {
        let registry = ReaderRegistry::new();
        registry.register(dummy_descriptor());
        assert!(registry.descriptor_for("SVS").is_some());
        assert!(registry.descriptor_for(".svs").is_some());
        assert!(registry.descriptor_for("tiff").is_some());
    }

    #[test]
    fn unregistered_extension_is_not_found() {
        let registry = ReaderRegistry::new();
        let err = registry.open("slide.mrxs").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn registered_formats_are_deduplicated_across_aliases() {
        let registry = ReaderRegistry::new();
        registry.register(dummy_descriptor());
        assert_eq!(registry.registered_formats(), vec!["aperio-svs"]);
    }

    #[test]
    fn default_registry_knows_both_formats() {
        let registry = default_registry();
        assert_eq!(registry.registered_formats(), vec!["3dhistech-mrxs", "aperio-svs"]);
        assert!(registry.descriptor_for("mrxs").is_some());
        assert!(registry.descriptor_for("svs").is_some());
    }

    #[test]
    fn formats_with_capability_filters_by_predicate() {
        let registry = default_registry();
        assert_eq!(registry.formats_with_capability(|c| c.overlapping_tiles), vec!["3dhistech-mrxs"]);
    }

    #[test]
    fn registered_extensions_lists_all_aliases() {
        let registry = default_registry();
        assert_eq!(registry.registered_extensions(), vec!["mrxs", "svs", "tif", "tiff"]);
    }
}
