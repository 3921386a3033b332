use super::*;

/// How section levels are derived when markup did not supply them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LevelRule {
    NumberedPrefix,
    IndentDepth,
    FlatFallback,
}

pub(crate) fn choose_level_rule(resolved: &[ResolvedCandidate]) -> LevelRule {
    if resolved.is_empty() {
        return LevelRule::FlatFallback;
    }
    if resolved
        .iter()
        .all(|item| item.candidate.numbering.is_some())
    {
        return LevelRule::NumberedPrefix;
    }
    if resolved
        .iter()
        .any(|item| item.candidate.level.is_some() || item.candidate.numbering.is_some())
    {
        return LevelRule::IndentDepth;
    }
    LevelRule::FlatFallback
}

/// Depth of a section number: "2" is 1, "2.1" is 2, "A.3" is 2. A candidate
/// whose numbering extends a preceding candidate's prefix thereby lands one
/// level below it.
pub(crate) fn numbering_depth(numbering: &str) -> u32 {
    numbering
        .split('.')
        .filter(|part| !part.is_empty())
        .count()
        .max(1) as u32
}

pub(crate) fn effective_levels(resolved: &[ResolvedCandidate]) -> Vec<u32> {
    match choose_level_rule(resolved) {
        LevelRule::NumberedPrefix => resolved
            .iter()
            .map(|item| {
                item.candidate
                    .numbering
                    .as_deref()
                    .map(numbering_depth)
                    .unwrap_or(1)
            })
            .collect(),
        LevelRule::IndentDepth => resolved
            .iter()
            .map(|item| {
                item.candidate
                    .level
                    .or_else(|| item.candidate.numbering.as_deref().map(numbering_depth))
                    .unwrap_or(1)
                    .max(1)
            })
            .collect(),
        LevelRule::FlatFallback => vec![1; resolved.len()],
    }
}

/// Builds the node tree from the flat resolved candidate list. Candidates
/// are processed in source order against a stack of open nodes; a candidate
/// whose level does not exceed the stack top closes nodes until strict
/// level nesting is restored. Contested spans go to the later candidate.
pub(crate) fn assemble_tree(
    doc_title: &str,
    resolved: Vec<ResolvedCandidate>,
    unit_count: usize,
) -> Node {
    let last_unit = unit_count.saturating_sub(1);
    let mut root = Node::new(doc_title, 0, 0, last_unit);

    let levels = effective_levels(&resolved);
    let items = drop_shadowed(resolved.into_iter().zip(levels).collect(), last_unit);

    let mut stack: Vec<Node> = Vec::new();

    for (item, level) in items {
        let start = item.resolved_start;

        while stack.last().is_some_and(|top| top.level >= level) {
            if let Some(mut closed) = stack.pop() {
                closed.end_unit = start - 1;
                attach(closed, &mut stack, &mut root);
            }
        }

        let mut node = Node::new(item.candidate.title, level, start, last_unit);
        node.low_confidence = item.low_confidence;
        stack.push(node);
    }

    while let Some(closed) = stack.pop() {
        attach(closed, &mut stack, &mut root);
    }

    root
}

fn attach(node: Node, stack: &mut Vec<Node>, root: &mut Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.children.push(node),
    }
}

/// "Later wins": an earlier candidate loses its claim when a later one
/// starts at or before it at the same or a shallower level. A deeper
/// candidate sharing the start unit is legitimate nesting (a section whose
/// first subsection begins on the parent's opening unit) and is kept. The
/// kept sequence has non-decreasing starts, and equal-start runs have
/// strictly increasing levels, which the stack construction relies on.
fn drop_shadowed(
    items: Vec<(ResolvedCandidate, u32)>,
    last_unit: usize,
) -> Vec<(ResolvedCandidate, u32)> {
    let mut kept: Vec<(ResolvedCandidate, u32)> = Vec::new();

    for (mut item, level) in items {
        item.resolved_start = item.resolved_start.min(last_unit);

        while kept.last().is_some_and(|(prev, prev_level)| {
            prev.resolved_start > item.resolved_start
                || (prev.resolved_start == item.resolved_start && level <= *prev_level)
        }) {
            if let Some((dropped, _)) = kept.pop() {
                warn!(
                    title = %dropped.candidate.title,
                    source_order = dropped.candidate.source_order,
                    start = dropped.resolved_start,
                    "dropping candidate shadowed by a later sibling"
                );
            }
        }
        kept.push((item, level));
    }

    kept
}
