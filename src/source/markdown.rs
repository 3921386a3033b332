use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::{DocumentSource, SourceKind, TextUnit, doc_name_for};

/// Line-block adapter for Markdown. Blank-line-delimited blocks become units
/// whose anchors are 1-based line numbers in the source file.
pub struct MarkdownSource {
    path: PathBuf,
    doc_name: String,
}

impl MarkdownSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            doc_name: doc_name_for(path),
        }
    }
}

impl DocumentSource for MarkdownSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Markdown
    }

    fn doc_name(&self) -> &str {
        &self.doc_name
    }

    fn load_units(&self) -> Result<Vec<TextUnit>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read markdown file: {}", self.path.display()))?;

        let units = units_from_text(&text);
        if units.is_empty() {
            bail!(
                "document contains no extractable text: {}",
                self.path.display()
            );
        }

        Ok(units)
    }
}

pub fn units_from_text(text: &str) -> Vec<TextUnit> {
    fn flush(lines: &mut Vec<&str>, start: u32, units: &mut Vec<TextUnit>) {
        if lines.is_empty() {
            return;
        }
        let last = start + lines.len() as u32 - 1;
        units.push(TextUnit {
            id: units.len(),
            anchor: start,
            anchor_last: last,
            text: lines.join("\n"),
        });
        lines.clear();
    }

    let mut units = Vec::<TextUnit>::new();
    let mut block_lines = Vec::<&str>::new();
    let mut block_start = 0u32;

    for (index, line) in text.lines().enumerate() {
        let line_number = index as u32 + 1;
        if line.trim().is_empty() {
            flush(&mut block_lines, block_start, &mut units);
            continue;
        }
        if block_lines.is_empty() {
            block_start = line_number;
        }
        block_lines.push(line);
    }
    flush(&mut block_lines, block_start, &mut units);

    units
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn units_from_text_tracks_line_anchors() {
        let text = "# Title\n\nfirst paragraph\nsecond line\n\n\nlast block\n";
        let units = units_from_text(text);

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].anchor, 1);
        assert_eq!(units[0].anchor_last, 1);
        assert_eq!(units[1].anchor, 3);
        assert_eq!(units[1].anchor_last, 4);
        assert_eq!(units[2].anchor, 7);
        assert_eq!(units[2].text, "last block");
        assert_eq!(units.iter().map(|u| u.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn empty_file_is_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".md")
            .tempfile()
            .expect("temp file");
        write!(file, "\n\n  \n").expect("write");

        let source = MarkdownSource::new(file.path());
        assert!(source.load_units().is_err());
    }
}
