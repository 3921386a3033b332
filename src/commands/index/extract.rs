use super::*;

const MIN_TOC_ENTRIES: usize = 3;

/// Scans the unit sequence for structural cues and emits heading candidates
/// in source order, plus the unit where the document body starts (past any
/// TOC region, which would otherwise shadow every title search). A document
/// without any cue yields an empty list and the pipeline degrades to a
/// single document-level node.
pub(crate) fn extract_candidates(
    units: &[TextUnit],
    kind: SourceKind,
    toc_check_units: usize,
) -> Result<(Vec<HeadingCandidate>, usize)> {
    let mut body_start_unit = 0;
    let mut candidates = match kind {
        SourceKind::Markdown => markdown_candidates(units)?,
        SourceKind::Pdf => {
            let toc_parser = TocEntryParser::new()?;
            let (toc_entries, toc_units) = detect_toc(units, toc_check_units, &toc_parser)?;
            if toc_entries.len() >= MIN_TOC_ENTRIES {
                body_start_unit = toc_units.iter().max().map(|id| id + 1).unwrap_or(0);
                candidates_from_toc(units, toc_entries, &toc_units)
            } else {
                body_candidates(units, &toc_units, &toc_parser)?
            }
        }
    };

    for (source_order, candidate) in candidates.iter_mut().enumerate() {
        candidate.source_order = source_order;
    }

    Ok((candidates, body_start_unit))
}

struct TocEntry {
    numbering: Option<String>,
    title: String,
    page: Option<u32>,
}

struct TocEntryParser {
    leader_regex: Regex,
    plain_regex: Regex,
}

impl TocEntryParser {
    fn new() -> Result<Self> {
        Ok(Self {
            // "1.2 Memory model ........ 34" or "A Appendix title .... 120"
            leader_regex: Regex::new(
                r"^\s*(?:(?P<num>\d+(?:\.\d+)*|[A-Z])[.)]?\s+)?(?P<title>\S.*?)\s*\.{2,}\s*(?P<page>\d{1,4})\s*$",
            )
            .context("failed to compile toc leader regex")?,
            // "1.2 Memory model 34" (numbering required to avoid prose)
            plain_regex: Regex::new(
                r"^\s*(?P<num>\d+(?:\.\d+)*)[.)]?\s+(?P<title>\S.*?)\s+(?P<page>\d{1,4})\s*$",
            )
            .context("failed to compile toc entry regex")?,
        })
    }

    fn parse(&self, line: &str) -> Option<TocEntry> {
        let condensed = condense_whitespace(line);
        if condensed.is_empty() {
            return None;
        }

        let captures = self
            .leader_regex
            .captures(&condensed)
            .or_else(|| self.plain_regex.captures(&condensed))?;

        let title = captures["title"].trim_end_matches('.').trim().to_string();
        if title.is_empty() || !title.chars().any(|ch| ch.is_alphabetic()) {
            return None;
        }

        Some(TocEntry {
            numbering: captures.name("num").map(|num| num.as_str().to_string()),
            title,
            page: captures
                .name("page")
                .and_then(|page| page.as_str().parse::<u32>().ok()),
        })
    }
}

/// Looks for a contents heading within the first `toc_check_units` units and
/// parses the entry lines that follow it, possibly spilling across units.
/// Returns the parsed entries plus the units the TOC occupies, so body
/// scanning can skip them.
fn detect_toc(
    units: &[TextUnit],
    toc_check_units: usize,
    toc_parser: &TocEntryParser,
) -> Result<(Vec<TocEntry>, HashSet<usize>)> {
    let toc_header_regex = Regex::new(r"(?i)^\s*(table of contents|contents|toc)\s*$")
        .context("failed to compile toc header regex")?;

    let mut entries = Vec::<TocEntry>::new();
    let mut toc_units = HashSet::<usize>::new();

    let header_unit = units.iter().take(toc_check_units).position(|unit| {
        unit.text
            .lines()
            .any(|line| toc_header_regex.is_match(line))
    });
    let Some(header_unit) = header_unit else {
        return Ok((entries, toc_units));
    };

    for unit in &units[header_unit..] {
        let unit_entries = unit
            .text
            .lines()
            .filter_map(|line| toc_parser.parse(line))
            .collect::<Vec<TocEntry>>();

        if unit_entries.is_empty() && unit.id != header_unit {
            break;
        }

        toc_units.insert(unit.id);
        entries.extend(unit_entries);
    }

    Ok((entries, toc_units))
}

fn candidates_from_toc(
    units: &[TextUnit],
    entries: Vec<TocEntry>,
    toc_units: &HashSet<usize>,
) -> Vec<HeadingCandidate> {
    let after_toc = toc_units.iter().max().map(|id| id + 1).unwrap_or(0);
    let mut last_approx = after_toc.min(units.len().saturating_sub(1));
    let mut candidates = Vec::<HeadingCandidate>::new();

    for entry in entries {
        let approx_unit = entry
            .page
            .and_then(|page| unit_for_anchor(units, page))
            .unwrap_or(last_approx);
        last_approx = approx_unit;

        let level = entry.numbering.as_deref().map(numbering_depth);
        candidates.push(HeadingCandidate {
            title: entry.title,
            level,
            numbering: entry.numbering,
            source_order: 0,
            approx_unit,
        });
    }

    candidates
}

fn body_candidates(
    units: &[TextUnit],
    skip_units: &HashSet<usize>,
    toc_parser: &TocEntryParser,
) -> Result<Vec<HeadingCandidate>> {
    let numbered_regex = Regex::new(r"^(?P<num>\d+(?:\.\d+)*)[.)]?\s+(?P<title>\S.*)$")
        .context("failed to compile numbered heading regex")?;
    let appendix_regex = Regex::new(r"(?i)^appendix\s+(?P<letter>[a-z])\b[.:]?\s*(?P<title>.*)$")
        .context("failed to compile appendix heading regex")?;

    let mut candidates = Vec::<HeadingCandidate>::new();
    let mut seen = HashSet::<String>::new();

    for unit in units {
        if skip_units.contains(&unit.id) {
            continue;
        }

        for line in unit.text.lines() {
            let condensed = condense_whitespace(line);
            // A stray TOC-entry line would duplicate a heading it points at.
            if condensed.is_empty() || toc_parser.parse(&condensed).is_some() {
                continue;
            }

            if let Some(captures) = numbered_regex.captures(&condensed) {
                let numbering = captures["num"].to_string();
                let title = captures["title"].trim().to_string();
                if !heading_like(&title) {
                    continue;
                }
                if !seen.insert(format!("{} {}", numbering, title.to_lowercase())) {
                    continue;
                }
                let level = numbering_depth(&numbering);
                candidates.push(HeadingCandidate {
                    title,
                    level: Some(level),
                    numbering: Some(numbering),
                    source_order: 0,
                    approx_unit: unit.id,
                });
                continue;
            }

            if let Some(captures) = appendix_regex.captures(&condensed) {
                let numbering = captures["letter"].to_ascii_uppercase();
                if !seen.insert(format!("appendix {}", numbering)) {
                    continue;
                }
                candidates.push(HeadingCandidate {
                    title: condensed.clone(),
                    level: Some(1),
                    numbering: Some(numbering),
                    source_order: 0,
                    approx_unit: unit.id,
                });
            }
        }
    }

    Ok(candidates)
}

fn markdown_candidates(units: &[TextUnit]) -> Result<Vec<HeadingCandidate>> {
    let heading_regex = Regex::new(r"^(?P<hashes>#{1,6})\s+(?P<title>\S.*)$")
        .context("failed to compile markdown heading regex")?;

    let mut candidates = Vec::<HeadingCandidate>::new();
    let mut in_fence = false;

    for unit in units {
        for line in unit.text.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            let Some(captures) = heading_regex.captures(line) else {
                continue;
            };

            let level = captures["hashes"].len() as u32;
            let title = captures["title"]
                .trim()
                .trim_end_matches('#')
                .trim()
                .to_string();
            if title.is_empty() {
                continue;
            }

            let numbering = leading_numbering(&title);
            candidates.push(HeadingCandidate {
                title,
                level: Some(level),
                numbering,
                source_order: 0,
                approx_unit: unit.id,
            });
        }
    }

    Ok(candidates)
}

fn leading_numbering(title: &str) -> Option<String> {
    let first = title.split_whitespace().next()?;
    let trimmed = first.trim_end_matches(['.', ')']);
    if !trimmed.is_empty()
        && trimmed.chars().all(|ch| ch.is_ascii_digit() || ch == '.')
        && trimmed.chars().any(|ch| ch.is_ascii_digit())
    {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn heading_like(title: &str) -> bool {
    let len = title.chars().count();
    if len < 2 || len > 120 {
        return false;
    }
    if title.ends_with(['.', ',', ';', ':']) {
        return false;
    }

    let alpha = title.chars().filter(|ch| ch.is_alphabetic()).count();
    if alpha < 2 {
        return false;
    }

    title
        .chars()
        .find(|ch| ch.is_alphabetic())
        .is_some_and(|ch| ch.is_uppercase())
}
