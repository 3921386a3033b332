use super::*;

/// Inclusive unit range a candidate heading may legitimately start in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SearchWindow {
    pub first_unit: usize,
    pub last_unit: usize,
}

impl SearchWindow {
    pub(crate) fn contains(&self, unit: usize) -> bool {
        unit >= self.first_unit && unit <= self.last_unit
    }

    pub(crate) fn clamp(&self, unit: usize) -> usize {
        unit.clamp(self.first_unit, self.last_unit)
    }

    pub(crate) fn width(&self) -> usize {
        self.last_unit - self.first_unit + 1
    }

    /// Half-width window around `pivot`, biased toward the indicated side.
    pub(crate) fn narrowed(&self, pivot: usize, side: Option<SpanAdjustment>) -> SearchWindow {
        let width = (self.width() / 2).max(1);
        match side {
            Some(SpanAdjustment::ShiftEarlier) => SearchWindow {
                first_unit: pivot.saturating_sub(width),
                last_unit: pivot,
            },
            Some(SpanAdjustment::ShiftLater) => SearchWindow {
                first_unit: pivot,
                last_unit: pivot + width,
            },
            None => SearchWindow {
                first_unit: pivot.saturating_sub(width / 2),
                last_unit: pivot + width.div_ceil(2),
            },
        }
    }

    pub(crate) fn bounded(&self, max_unit: usize) -> SearchWindow {
        SearchWindow {
            first_unit: self.first_unit.min(max_unit),
            last_unit: self.last_unit.min(max_unit),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundaryResolution {
    pub resolved_start: usize,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchStrength {
    Exact,
    Normalized,
    Fuzzy,
}

/// Units inside the window whose text matches the title, with the strength
/// of the strongest pass that produced any hit. Exact substring matches are
/// preferred over case/whitespace-insensitive ones, which are preferred over
/// word-bag fuzzy hits.
pub(crate) fn title_matches(
    units: &[TextUnit],
    window: SearchWindow,
    title: &str,
) -> (Vec<usize>, Option<MatchStrength>) {
    let needle = condense_whitespace(title);
    if needle.is_empty() || units.is_empty() {
        return (Vec::new(), None);
    }

    let window = window.bounded(units.len() - 1);
    let candidates = &units[window.first_unit..=window.last_unit];

    let exact: Vec<usize> = candidates
        .iter()
        .filter(|unit| condense_whitespace(&unit.text).contains(&needle))
        .map(|unit| unit.id)
        .collect();
    if !exact.is_empty() {
        return (exact, Some(MatchStrength::Exact));
    }

    let lower_needle = needle.to_lowercase();
    let normalized: Vec<usize> = candidates
        .iter()
        .filter(|unit| {
            condense_whitespace(&unit.text)
                .to_lowercase()
                .contains(&lower_needle)
        })
        .map(|unit| unit.id)
        .collect();
    if !normalized.is_empty() {
        return (normalized, Some(MatchStrength::Normalized));
    }

    let words: Vec<&str> = lower_needle
        .split_whitespace()
        .filter(|word| word.chars().count() >= 3)
        .collect();
    if words.is_empty() {
        return (Vec::new(), None);
    }

    let fuzzy: Vec<usize> = candidates
        .iter()
        .filter(|unit| {
            let haystack = unit.text.to_lowercase();
            words.iter().all(|word| haystack.contains(word))
        })
        .map(|unit| unit.id)
        .collect();
    if !fuzzy.is_empty() {
        return (fuzzy, Some(MatchStrength::Fuzzy));
    }

    (Vec::new(), None)
}

/// Tags every unit in the window so the oracle can answer with a unit id.
pub(crate) fn format_window_text(units: &[TextUnit], window: SearchWindow) -> String {
    let window = window.bounded(units.len().saturating_sub(1));
    let mut out = String::new();
    for unit in &units[window.first_unit..=window.last_unit] {
        out.push_str(&format!("<unit {}>\n", unit.id));
        out.push_str(truncate_chars(unit.text.trim(), WINDOW_UNIT_TEXT_CAP));
        out.push('\n');
    }
    out
}

/// Resolves one candidate's exact starting unit inside its window. A unique
/// confident text match short-circuits without consulting the oracle; an
/// oracle answer outside the window is clamped and flagged; an oracle
/// failure (after the policy's retries) falls back to the approximate
/// position, flagged low confidence.
pub(crate) async fn resolve_candidate(
    units: &[TextUnit],
    title: &str,
    approx_unit: usize,
    window: SearchWindow,
    oracle: &dyn Oracle,
    policy: &OraclePolicy,
    cancel: &CancellationToken,
) -> BoundaryResolution {
    let window = window.bounded(units.len().saturating_sub(1));
    let (matches, strength) = title_matches(units, window, title);

    if matches.len() == 1
        && matches!(
            strength,
            Some(MatchStrength::Exact | MatchStrength::Normalized)
        )
    {
        return BoundaryResolution {
            resolved_start: matches[0],
            low_confidence: false,
        };
    }

    if cancel.is_cancelled() {
        return BoundaryResolution {
            resolved_start: window.clamp(approx_unit),
            low_confidence: true,
        };
    }

    let window_text = format_window_text(units, window);
    match policy
        .call("resolve_boundary", || {
            oracle.resolve_boundary(title, &window_text)
        })
        .await
    {
        Ok(judgment) if window.contains(judgment.unit_id) => BoundaryResolution {
            resolved_start: judgment.unit_id,
            low_confidence: judgment.confidence == JudgmentConfidence::Low,
        },
        Ok(judgment) => {
            debug!(
                title,
                answer = judgment.unit_id,
                first = window.first_unit,
                last = window.last_unit,
                "oracle answer outside window, clamping"
            );
            BoundaryResolution {
                resolved_start: window.clamp(judgment.unit_id),
                low_confidence: true,
            }
        }
        Err(error) => {
            warn!(title, error = %error, "boundary resolution degraded to heuristic");
            BoundaryResolution {
                resolved_start: window.clamp(approx_unit),
                low_confidence: true,
            }
        }
    }
}

/// Resolves the whole flat candidate list. Windows are derived from the
/// neighbouring approximate positions and floored at `search_floor` (the
/// first body unit), so sibling resolutions are independent and run
/// concurrently under the policy's throttle; the output order always equals
/// source order.
pub(crate) async fn resolve_candidates(
    units: &[TextUnit],
    candidates: Vec<HeadingCandidate>,
    search_floor: usize,
    oracle: &dyn Oracle,
    policy: &OraclePolicy,
    cancel: &CancellationToken,
) -> Vec<ResolvedCandidate> {
    if candidates.is_empty() || units.is_empty() {
        return Vec::new();
    }

    let last_unit = units.len() - 1;
    let floor = search_floor.min(last_unit);
    let approxes: Vec<usize> = candidates
        .iter()
        .map(|candidate| candidate.approx_unit.clamp(floor, last_unit))
        .collect();

    let windows: Vec<SearchWindow> = (0..candidates.len())
        .map(|index| {
            let approx = approxes[index];
            let first = if index == 0 {
                floor
            } else {
                approxes[index - 1].min(approx)
            };
            let last = if index + 1 < candidates.len() {
                approxes[index + 1].max(approx)
            } else {
                last_unit
            };
            SearchWindow {
                first_unit: first,
                last_unit: last,
            }
        })
        .collect();

    let resolutions = join_all(
        candidates
            .iter()
            .zip(windows.iter().zip(&approxes))
            .map(|(candidate, (window, approx))| {
                resolve_candidate(
                    units,
                    &candidate.title,
                    *approx,
                    *window,
                    oracle,
                    policy,
                    cancel,
                )
            }),
    )
    .await;

    candidates
        .into_iter()
        .zip(resolutions)
        .map(|(candidate, resolution)| ResolvedCandidate {
            candidate,
            resolved_start: resolution.resolved_start,
            low_confidence: resolution.low_confidence,
        })
        .collect()
}
