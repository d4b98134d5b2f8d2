#![deny(missing_docs)]

//! # Reference Utilities
//!
//! Resolution of `$ref` strings to `#/components/{section}/{name}` entries.
//!
//! External documents are never fetched. A reference with a document part
//! is treated as local only when that part names the document itself
//! through its `$self` URI.

use percent_encoding::percent_decode_str;
use url::Url;

/// A parsed reference to a component of the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ComponentRef {
    /// Components section, e.g. `schemas`.
    pub section: String,
    /// Component name, pointer-decoded.
    pub name: String,
}

/// Parses `ref_str` into a component reference of the current document.
///
/// Returns `None` for external references and for pointers that do not
/// address a direct child of a components section.
pub(crate) fn parse_component_ref(ref_str: &str, self_uri: Option<&str>) -> Option<ComponentRef> {
    let (document, fragment) = ref_str.split_once('#')?;
    if !document.is_empty() && !self_uri.is_some_and(|s| same_document(document, s)) {
        return None;
    }

    let mut segments = fragment.strip_prefix('/')?.split('/');
    if segments.next()? != "components" {
        return None;
    }
    let section = decode_pointer_segment(segments.next()?);
    let name = decode_pointer_segment(segments.next()?);
    if segments.next().is_some() || name.is_empty() {
        return None;
    }

    Some(ComponentRef { section, name })
}

/// Extracts the component name when `ref_str` points into `section`.
pub(crate) fn extract_component_name(
    ref_str: &str,
    self_uri: Option<&str>,
    section: &str,
) -> Option<String> {
    parse_component_ref(ref_str, self_uri)
        .filter(|r| r.section == section)
        .map(|r| r.name)
}

/// Decodes a JSON Pointer segment (handles `~1`, `~0` and percent-encoding).
pub(crate) fn decode_pointer_segment(segment: &str) -> String {
    let decoded = segment.replace("~1", "/").replace("~0", "~");
    percent_decode_str(&decoded).decode_utf8_lossy().into_owned()
}

fn same_document(document: &str, self_uri: &str) -> bool {
    if document == self_uri {
        return true;
    }
    match (Url::parse(document), Url::parse(self_uri)) {
        (Ok(doc), Ok(own)) => {
            doc.scheme() == own.scheme()
                && doc.host() == own.host()
                && doc.port() == own.port()
                && doc.path() == own.path()
        }
        (Ok(doc), Err(_)) if self_uri.starts_with('/') => doc.path() == self_uri,
        _ => false,
    }
}
