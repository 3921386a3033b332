//! Core tree data model shared by the index pipeline.
//!
//! `HeadingCandidate` values are produced once by the extractor and only
//! annotated with a resolved start. `Node` values are built by the assembler
//! and mutated in place by the verifier until no mismatches remain; children
//! are owned by value so each subtree has a single owner during parallel
//! verification.

#[derive(Debug, Clone)]
pub struct HeadingCandidate {
    pub title: String,
    pub level: Option<u32>,
    pub numbering: Option<String>,
    pub source_order: usize,
    pub approx_unit: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    pub candidate: HeadingCandidate,
    pub resolved_start: usize,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub title: String,
    pub level: u32,
    pub start_unit: usize,
    pub end_unit: usize,
    pub low_confidence: bool,
    pub summary: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(title: impl Into<String>, level: u32, start_unit: usize, end_unit: usize) -> Self {
        Self {
            title: title.into(),
            level,
            start_unit,
            end_unit,
            low_confidence: false,
            summary: None,
            children: Vec::new(),
        }
    }

    pub fn walk<F: FnMut(&Node)>(&self, visit: &mut F) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    pub fn low_confidence_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| {
            if node.low_confidence {
                count += 1;
            }
        });
        count
    }
}

/// Checks the structural invariants of an assembled tree and returns one
/// message per violation. Sibling spans must partition the parent's span
/// contiguously; the only permitted gap is a preamble before the first
/// child. An empty result means the tree is well-formed.
pub fn partition_violations(root: &Node, unit_count: usize) -> Vec<String> {
    let mut violations = Vec::new();

    if unit_count == 0 {
        violations.push("document has no text units".to_string());
        return violations;
    }

    if root.end_unit != unit_count - 1 || root.start_unit != 0 {
        violations.push(format!(
            "root span [{}, {}] does not cover units [0, {}]",
            root.start_unit,
            root.end_unit,
            unit_count - 1
        ));
    }

    check_node(root, &mut violations);
    violations
}

fn check_node(node: &Node, violations: &mut Vec<String>) {
    if node.start_unit > node.end_unit {
        violations.push(format!(
            "node '{}' has inverted span [{}, {}]",
            node.title, node.start_unit, node.end_unit
        ));
    }

    if node.children.is_empty() {
        return;
    }

    for child in &node.children {
        if child.start_unit < node.start_unit || child.end_unit > node.end_unit {
            violations.push(format!(
                "child '{}' span [{}, {}] escapes parent '{}' span [{}, {}]",
                child.title,
                child.start_unit,
                child.end_unit,
                node.title,
                node.start_unit,
                node.end_unit
            ));
        }

        if child.level <= node.level {
            violations.push(format!(
                "child '{}' level {} does not exceed parent '{}' level {}",
                child.title, child.level, node.title, node.level
            ));
        }
    }

    for pair in node.children.windows(2) {
        if pair[1].start_unit != pair[0].end_unit + 1 {
            violations.push(format!(
                "siblings '{}' and '{}' are not contiguous: [{}, {}] then [{}, {}]",
                pair[0].title,
                pair[1].title,
                pair[0].start_unit,
                pair[0].end_unit,
                pair[1].start_unit,
                pair[1].end_unit
            ));
        }
    }

    if let Some(last) = node.children.last() {
        if last.end_unit != node.end_unit {
            violations.push(format!(
                "last child '{}' ends at {} but parent '{}' ends at {}",
                last.title, last.end_unit, node.title, node.end_unit
            ));
        }
    }

    for child in &node.children {
        check_node(child, violations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(title: &str, level: u32, start: usize, end: usize) -> Node {
        Node::new(title, level, start, end)
    }

    #[test]
    fn well_formed_tree_with_preamble_passes() {
        let mut root = Node::new("doc", 0, 0, 5);
        root.children = vec![leaf("a", 1, 1, 3), leaf("b", 1, 4, 5)];

        assert!(partition_violations(&root, 6).is_empty());
    }

    #[test]
    fn sibling_gap_is_reported() {
        let mut root = Node::new("doc", 0, 0, 5);
        root.children = vec![leaf("a", 1, 0, 2), leaf("b", 1, 4, 5)];

        let violations = partition_violations(&root, 6);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("not contiguous"));
    }

    #[test]
    fn child_escaping_parent_and_level_inversion_are_reported() {
        let mut root = Node::new("doc", 0, 0, 4);
        let mut section = leaf("a", 1, 0, 4);
        section.children = vec![leaf("a.1", 1, 0, 5)];
        root.children = vec![section];

        let violations = partition_violations(&root, 5);
        assert!(violations.iter().any(|v| v.contains("escapes parent")));
        assert!(violations.iter().any(|v| v.contains("does not exceed parent")));
    }

    #[test]
    fn dangling_last_child_is_reported() {
        let mut root = Node::new("doc", 0, 0, 5);
        root.children = vec![leaf("a", 1, 0, 3)];

        let violations = partition_violations(&root, 6);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("last child"));
    }
}
