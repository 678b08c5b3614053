//! Worksheet protection marker removal.
//!
//! A worksheet is "protected" when its root element carries a `<sheetProtection>` child. The
//! element is only a flag (plus an optional password hash); removing it unlocks the sheet without
//! touching anything else in the package.

use std::ops::Range;

use log::debug;
use roxmltree::{Document as XmlDocument, Node, ParsingOptions};

use crate::package::Document;
use crate::xml::{decode_xml_bytes, encode_xml_text};
use crate::{MalformedPartError, XmlError};

pub const WORKSHEETS_DIR: &str = "xl/worksheets/";
pub const SHEET_PROTECTION_TAG: &str = "sheetProtection";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerOptions {
    /// Local tag name of the marker element. The prefix (if any) is taken from the worksheet's
    /// root element, so `x:worksheet` roots match `x:sheetProtection`.
    pub tag: String,
}

impl Default for MarkerOptions {
    fn default() -> Self {
        Self {
            tag: SHEET_PROTECTION_TAG.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartEdit {
    pub part: String,
    pub markers_removed: usize,
}

/// Worksheet parts changed by [`unprotect_document`], in archive order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSummary {
    pub edits: Vec<PartEdit>,
}

impl EditSummary {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn markers_removed(&self) -> usize {
        self.edits.iter().map(|edit| edit.markers_removed).sum()
    }
}

/// Whether `name` is a worksheet part: an `.xml` file directly inside `xl/worksheets/`.
///
/// Nested directories (e.g. `xl/worksheets/_rels/sheet1.xml.rels`) are not worksheets.
pub fn is_worksheet_part(name: &str) -> bool {
    name.strip_prefix(WORKSHEETS_DIR)
        .is_some_and(|file| !file.contains('/') && file.len() > ".xml".len() && file.ends_with(".xml"))
}

/// Strip protection markers from every worksheet part of `doc`.
///
/// All worksheet parts are parsed before any part is replaced, so a malformed worksheet leaves
/// the document untouched.
pub fn unprotect_document(
    doc: &mut Document,
    options: &MarkerOptions,
) -> Result<EditSummary, MalformedPartError> {
    let mut pending = Vec::new();
    for part in doc.parts().filter(|part| is_worksheet_part(part.name())) {
        let edited = edit_worksheet(part.bytes(), options).map_err(|source| MalformedPartError {
            part: part.name().to_string(),
            source,
        })?;
        if let Some((bytes, markers_removed)) = edited {
            debug!(
                "removing {markers_removed} protection marker(s) from {}",
                part.name()
            );
            pending.push((part.name().to_string(), bytes, markers_removed));
        }
    }

    let mut summary = EditSummary::default();
    for (name, bytes, markers_removed) in pending {
        if let Some(part) = doc.parts_mut().find(|part| part.name() == name) {
            part.set_bytes(bytes);
        }
        summary.edits.push(PartEdit {
            part: name,
            markers_removed,
        });
    }

    Ok(summary)
}

/// Remove protection markers from a single worksheet XML part.
///
/// Returns `Ok(None)` when the part has no marker; otherwise the edited bytes, in the same text
/// encoding as the input. Everything outside the removed elements is kept byte-for-byte.
pub fn remove_protection_markers(
    xml: &[u8],
    options: &MarkerOptions,
) -> Result<Option<Vec<u8>>, XmlError> {
    Ok(edit_worksheet(xml, options)?.map(|(bytes, _)| bytes))
}

fn edit_worksheet(
    xml: &[u8],
    options: &MarkerOptions,
) -> Result<Option<(Vec<u8>, usize)>, XmlError> {
    let decoded = decode_xml_bytes(xml)?;
    let text: &str = &decoded.text;
    // Worksheets written by some producers carry a `<!DOCTYPE worksheet>` prolog.
    let doc = XmlDocument::parse_with_options(
        text,
        ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        },
    )?;

    let ranges = marker_ranges(&doc, text, &options.tag);
    if ranges.is_empty() {
        return Ok(None);
    }

    let mut edited = String::with_capacity(text.len());
    let mut cursor = 0;
    for range in &ranges {
        edited.push_str(&text[cursor..range.start]);
        cursor = range.end;
    }
    edited.push_str(&text[cursor..]);

    Ok(Some((encode_xml_text(&edited, decoded.encoding), ranges.len())))
}

/// Byte ranges (into `text`) of every root child element named like the marker, in document
/// order. Collected up front so removal never walks a tree it is mutating.
fn marker_ranges(doc: &XmlDocument<'_>, text: &str, tag: &str) -> Vec<Range<usize>> {
    let root = doc.root_element();
    let expected = match qualified_name(root, text).split_once(':') {
        Some((prefix, _)) => format!("{prefix}:{tag}"),
        None => tag.to_string(),
    };

    root.children()
        .filter(|child| child.is_element() && qualified_name(*child, text) == expected)
        .map(|child| child.range())
        .collect()
}

/// The element name exactly as written in the source, including any prefix.
fn qualified_name<'t>(node: Node<'_, '_>, text: &'t str) -> &'t str {
    let start = node.range().start;
    let raw = text.get(start..).unwrap_or_default();
    let raw = raw.strip_prefix('<').unwrap_or(raw);
    let end = raw
        .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
        .unwrap_or(raw.len());
    &raw[..end]
}
