//! Turning user input (pasted text, uploaded documents) into a link list.

use crate::{errors::Error, Result};

/// Default substring a line must contain to count as a link.
pub const DEFAULT_LINK_MARKER: &str = "t.me/";

/// How input lines are accepted as links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkFilter {
    /// Keep lines containing the marker substring.
    Marker(String),
    /// Keep every non-blank line.
    Verbatim,
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self::Marker(DEFAULT_LINK_MARKER.to_string())
    }
}

impl LinkFilter {
    fn accepts(&self, line: &str) -> bool {
        match self {
            Self::Marker(marker) => line.contains(marker.as_str()),
            Self::Verbatim => !line.is_empty(),
        }
    }
}

/// Split `text` into trimmed lines and keep the ones the filter accepts, in order.
///
/// Duplicates are kept; every copy is checked.
pub fn extract_links(text: &str, filter: &LinkFilter) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| filter.accepts(line))
        .map(str::to_string)
        .collect()
}

/// Decode an uploaded document as UTF-8 text.
pub fn decode_document(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Intake(format!("document is not valid UTF-8: {e}")))
}
