use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use super::{DocumentSource, SourceKind, TextUnit, doc_name_for};

/// Page-oriented adapter backed by the `pdftotext` text layer. Each page
/// becomes one unit whose anchor is the 1-based PDF page number.
pub struct PdfSource {
    path: PathBuf,
    doc_name: String,
    max_units: Option<usize>,
}

impl PdfSource {
    pub fn new(path: &Path, max_units: Option<usize>) -> Self {
        Self {
            path: path.to_path_buf(),
            doc_name: doc_name_for(path),
            max_units,
        }
    }
}

impl DocumentSource for PdfSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pdf
    }

    fn doc_name(&self) -> &str {
        &self.doc_name
    }

    fn load_units(&self) -> Result<Vec<TextUnit>> {
        let mut pages = extract_pages_with_pdftotext(&self.path, self.max_units)?;
        normalize_pages(&mut pages);

        if pages.iter().all(|page| page.trim().is_empty()) {
            bail!(
                "document contains no extractable text: {}",
                self.path.display()
            );
        }

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextUnit {
                id: index,
                anchor: (index + 1) as u32,
                anchor_last: (index + 1) as u32,
                text,
            })
            .collect())
    }
}

fn extract_pages_with_pdftotext(
    pdf_path: &Path,
    max_units: Option<usize>,
) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_units) = max_units {
        command.arg("-l").arg(max_units.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    if pages.is_empty() {
        bail!("document has no pages: {}", pdf_path.display());
    }

    Ok(pages)
}

/// Strips repeated header/footer edge lines and rejoins hyphenated line
/// breaks so heading matches are not broken across lines.
pub(super) fn normalize_pages(pages: &mut [String]) {
    let header_candidates = detect_repeated_edge_lines(pages, true);
    let footer_candidates = detect_repeated_edge_lines(pages, false);

    for page in pages.iter_mut() {
        let mut lines = page
            .lines()
            .map(|line| line.to_string())
            .collect::<Vec<String>>();

        if let Some(index) = first_nonempty_line_index(&lines) {
            let candidate = normalize_edge_line(&lines[index]);
            if !candidate.is_empty() && header_candidates.contains(&candidate) {
                lines.remove(index);
            }
        }

        if let Some(index) = last_nonempty_line_index(&lines) {
            let candidate = normalize_edge_line(&lines[index]);
            if !candidate.is_empty() && footer_candidates.contains(&candidate) {
                lines.remove(index);
            }
        }

        let (normalized_lines, _merges) = merge_hyphenated_lines(lines);
        *page = normalized_lines.join("\n");
    }
}

fn detect_repeated_edge_lines(pages: &[String], header: bool) -> HashSet<String> {
    let mut counts = HashMap::<String, usize>::new();
    for page in pages {
        let lines = page.lines().map(str::trim).collect::<Vec<&str>>();
        let candidate = if header {
            lines.iter().copied().find(|line| !line.is_empty())
        } else {
            lines.iter().rev().copied().find(|line| !line.is_empty())
        };

        let Some(candidate) = candidate else {
            continue;
        };

        let normalized = normalize_edge_line(candidate);
        if normalized.is_empty() || normalized.len() > 120 {
            continue;
        }
        *counts.entry(normalized).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .filter_map(|(candidate, count)| if count >= 3 { Some(candidate) } else { None })
        .collect()
}

fn normalize_edge_line(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn first_nonempty_line_index(lines: &[String]) -> Option<usize> {
    lines.iter().position(|line| !line.trim().is_empty())
}

fn last_nonempty_line_index(lines: &[String]) -> Option<usize> {
    lines.iter().rposition(|line| !line.trim().is_empty())
}

fn merge_hyphenated_lines(lines: Vec<String>) -> (Vec<String>, usize) {
    let mut merged = Vec::<String>::new();
    let mut merges = 0usize;
    let mut index = 0usize;

    while index < lines.len() {
        let current = lines[index].clone();
        if index + 1 < lines.len() {
            let next = lines[index + 1].clone();
            if should_merge_hyphenated_pair(&current, &next) {
                let joined = format!(
                    "{}{}",
                    current.trim_end().trim_end_matches('-'),
                    next.trim_start()
                );
                merged.push(joined);
                merges += 1;
                index += 2;
                continue;
            }
        }

        merged.push(current);
        index += 1;
    }

    (merged, merges)
}

fn should_merge_hyphenated_pair(current: &str, next: &str) -> bool {
    let left = current.trim_end();
    if !left.ends_with('-') {
        return false;
    }

    let right = next.trim_start();
    let starts_with_lowercase = right
        .chars()
        .next()
        .map(|character| character.is_ascii_lowercase())
        .unwrap_or(false);
    if !starts_with_lowercase {
        return false;
    }

    left.trim_end_matches('-')
        .chars()
        .last()
        .map(|character| character.is_ascii_alphabetic())
        .unwrap_or(false)
}
