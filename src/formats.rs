//! Stock format set.
//!
//! The descriptors a standard deployment registers: the native XML
//! diagram format plus SVG and PNG export flavors. Hosts with their own
//! formats register additional descriptors alongside these.

use crate::format::{ContentKind, FormatDescriptor};

/// Key of the native diagram format.
pub const NATIVE_KEY: &str = "dio";

/// The native XML diagram format. Default for new documents.
pub fn xml_native() -> FormatDescriptor {
    FormatDescriptor::new(NATIVE_KEY, "Diagram", ".dio", "application/dio+xml")
        .with_factory("Diagram")
        .with_icon("diagram")
        .default_format()
}

/// SVG export flavor: the diagram rendered as standalone SVG with the
/// source embedded, still openable as a diagram.
pub fn svg_export() -> FormatDescriptor {
    FormatDescriptor::new("diosvg", "SVG", ".dio.svg", "image/svg+xml")
        .with_factory("Diagram (SVG)")
        .with_icon("diagram-svg")
        .export()
}

/// PNG export flavor. Surfaces hand PNG content over as a data URI;
/// the serializer strips it down to the bare base64 payload.
pub fn png_export() -> FormatDescriptor {
    FormatDescriptor::new("diopng", "PNG", ".dio.png", "image/png")
        .with_factory("Diagram (PNG)")
        .with_icon("diagram-png")
        .with_content_kind(ContentKind::Base64)
        .with_serializer(|raw| {
            raw.split_once(',')
                .map(|(_, data)| data.to_string())
                .unwrap_or_else(|| raw.to_string())
        })
        .export()
}

/// Every stock descriptor, native format first.
pub fn all() -> Vec<FormatDescriptor> {
    vec![xml_native(), svg_export(), png_export()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_format_is_the_default() {
        let native = xml_native();
        assert!(native.is_default);
        assert!(!native.is_export);
        assert_eq!(native.ext, ".dio");
    }

    #[test]
    fn stock_keys_are_unique() {
        let formats = all();
        let mut keys: Vec<_> = formats.iter().map(|f| f.key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), formats.len());
    }

    #[test]
    fn png_serializer_strips_data_uri_prefix() {
        let png = png_export();
        let serialize = png.serializer.unwrap();
        assert_eq!(serialize("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(serialize("QUJD"), "QUJD");
    }

    #[test]
    fn export_flavors_chain_off_the_native_extension() {
        assert!(svg_export().ext.starts_with(".dio"));
        assert!(png_export().ext.starts_with(".dio"));
        assert_eq!(png_export().content_kind, ContentKind::Base64);
    }
}
