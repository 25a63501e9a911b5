//! Reference classification and asset filename derivation.
//!
//! A reference is the destination string of an image or link node, exactly as
//! written in the source document. References are either remote (an absolute
//! `http`/`https` URL) or local (a path resolved relative to the document).

use percent_encoding::percent_decode_str;
use std::path::Path;
use url::Url;

/// Classification of a reference destination
#[derive(Debug, Clone)]
pub enum RefKind {
    /// An absolute URL with an `http` or `https` scheme
    Remote(Url),
    /// Anything else: a filesystem path relative to the source document
    Local,
}

impl RefKind {
    pub fn is_remote(&self) -> bool {
        matches!(self, RefKind::Remote(_))
    }
}

/// Classify a reference as remote or local.
///
/// Remote iff the string parses as an absolute URL with an `http` or `https`
/// scheme. Relative paths, `file:` URLs, anchors, and mailto links are all
/// local. Pure and total: there is no failure mode.
///
/// # Example
///
/// ```
/// use mdbundle::reference::classify;
///
/// assert!(classify("https://example.com/a.png").is_remote());
/// assert!(!classify("../images/a.png").is_remote());
/// ```
pub fn classify(reference: &str) -> RefKind {
    match Url::parse(reference) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => RefKind::Remote(url),
        _ => RefKind::Local,
    }
}

/// Derive the asset filename for a reference.
///
/// Uses the final non-empty path segment: the last URL path segment
/// (percent-decoded) for remote references, the file name for local ones.
/// References without a usable segment (e.g. `http://host/`) get a generated
/// `asset-<index>` name from the node's document-order index. Distinct
/// references may derive the same filename; the later asset overwrites the
/// earlier one.
pub fn derived_filename(reference: &str, node_index: usize) -> String {
    let segment = match classify(reference) {
        RefKind::Remote(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned()),
        RefKind::Local => Path::new(reference)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };

    match segment {
        // A decoded segment may contain separators; keep the name flat
        Some(name) if !name.is_empty() => name.replace(['/', '\\'], "_"),
        _ => format!("asset-{}", node_index),
    }
}

/// Basename of a reference, used in attachment placeholders.
pub fn basename(reference: &str) -> String {
    Path::new(reference)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| reference.to_string())
}
