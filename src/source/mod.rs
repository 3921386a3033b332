use std::path::Path;

use anyhow::{Result, bail};

pub mod markdown;
pub mod pdf;

pub use markdown::MarkdownSource;
pub use pdf::PdfSource;

/// Atomic addressable chunk of document text. `id` is the ordinal position
/// (0-based, gap-free); `anchor` is the physical page number for PDFs or the
/// first line number for Markdown blocks, `anchor_last` the last line covered
/// by the unit (equal to `anchor` for pages).
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub id: usize,
    pub anchor: u32,
    pub anchor_last: u32,
    pub text: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SourceKind {
    Pdf,
    Markdown,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
        }
    }
}

pub trait DocumentSource {
    fn kind(&self) -> SourceKind;

    fn doc_name(&self) -> &str;

    /// Unit ids are stable, monotonically increasing and gap-free within one
    /// document. Fails on unreadable input or a document with no extractable
    /// text.
    fn load_units(&self) -> Result<Vec<TextUnit>>;
}

pub fn open_document(path: &Path, max_units: Option<usize>) -> Result<Box<dyn DocumentSource>> {
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(Box::new(PdfSource::new(path, max_units))),
        "md" | "markdown" => Ok(Box::new(MarkdownSource::new(path))),
        other => bail!(
            "unsupported document type '{}' for {}; expected .pdf, .md or .markdown",
            other,
            path.display()
        ),
    }
}

pub fn doc_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document")
        .to_string()
}

/// Maps a printed page/line anchor back to the first unit at or past it.
/// Falls back to the last unit for anchors beyond the document.
pub fn unit_for_anchor(units: &[TextUnit], anchor: u32) -> Option<usize> {
    if units.is_empty() {
        return None;
    }

    units
        .iter()
        .position(|unit| unit.anchor_last >= anchor)
        .or(Some(units.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_for_anchor_maps_into_ranges_and_clamps_past_end() {
        let units = vec![
            TextUnit { id: 0, anchor: 1, anchor_last: 4, text: String::new() },
            TextUnit { id: 1, anchor: 5, anchor_last: 9, text: String::new() },
        ];

        assert_eq!(unit_for_anchor(&units, 1), Some(0));
        assert_eq!(unit_for_anchor(&units, 4), Some(0));
        assert_eq!(unit_for_anchor(&units, 6), Some(1));
        assert_eq!(unit_for_anchor(&units, 40), Some(1));
        assert_eq!(unit_for_anchor(&[], 1), None);
    }
}
