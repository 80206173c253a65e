//! End-to-end tests against the public crate surface: format dispatch
//! through [`ReaderRegistry`], and the error paths a caller hits before any
//! slide bytes are even touched.

use wsi_reader::{default_registry, ErrorKind, ReaderRegistry, SvsReader};

#[test]
fn registry_dispatches_svs_and_mrxs_by_extension() {
    let registry = default_registry();
    assert!(registry.descriptor_for("svs").is_some());
    assert!(registry.descriptor_for(".SVS").is_some());
    assert!(registry.descriptor_for("tiff").is_some());
    assert!(registry.descriptor_for("mrxs").is_some());
    assert_eq!(registry.registered_formats(), vec!["3dhistech-mrxs", "aperio-svs"]);
}

#[test]
fn registry_rejects_unknown_extension() {
    let registry = default_registry();
    let err = registry.open("slide.ndpi").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn registry_rejects_path_without_extension() {
    let registry = default_registry();
    let err = registry.open("slide").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn opening_missing_svs_file_fails() {
    let err = SvsReader::open("/nonexistent/sample.svs").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn opening_missing_mrxs_slide_fails_through_registry() {
    let registry = ReaderRegistry::new();
    registry.register(wsi_reader::FormatDescriptor {
        primary_extension: "mrxs",
        aliases: &[],
        format_name: "3dhistech-mrxs",
        capabilities: wsi_reader::Capabilities::default(),
        factory: std::sync::Arc::new(|path| {
            wsi_reader::MrxsReader::open(path).map(|r| Box::new(r) as Box<dyn wsi_reader::SlideReader>)
        }),
    });
    assert!(registry.open("/nonexistent/slide.mrxs").is_err());
}
