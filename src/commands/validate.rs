use std::fs;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ValidateArgs;
use crate::model::{TreeDocument, TreeNode};
use crate::util::write_json_pretty;

/// Audits a produced tree file against the structural ordering invariants:
/// no inverted ranges, strictly ordered non-overlapping siblings, children
/// contained in their parent, levels strictly increasing downward. Exact
/// unit contiguity is not recoverable from anchors alone (Markdown block
/// anchors are line numbers), so sibling checks are ordering checks here.
pub fn run(args: ValidateArgs) -> Result<()> {
    let data = fs::read_to_string(&args.tree_path)
        .with_context(|| format!("failed to read tree file: {}", args.tree_path.display()))?;
    let tree: TreeDocument = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse tree file: {}", args.tree_path.display()))?;

    let mut summary = ValidateSummary::default();
    audit_siblings(&tree.structure, None, &mut summary);

    info!(
        doc_name = %tree.doc_name,
        node_count = summary.node_count,
        low_confidence = summary.low_confidence_count,
        violations = summary.total_violations(),
        "tree audit finished"
    );

    for finding in &summary.findings {
        warn!(finding = %finding, "invariant violation");
    }

    if let Some(report_path) = &args.report_path {
        write_json_pretty(report_path, &summary)?;
        info!(report = %report_path.display(), "audit report written");
    }

    if summary.total_violations() > 0 {
        bail!(
            "tree failed validation with {} violation(s)",
            summary.total_violations()
        );
    }

    Ok(())
}

#[derive(Debug, Default, Serialize)]
struct ValidateSummary {
    node_count: usize,
    low_confidence_count: usize,
    inverted_range_count: usize,
    sibling_order_violation_count: usize,
    sibling_overlap_count: usize,
    containment_violation_count: usize,
    level_order_violation_count: usize,
    findings: Vec<String>,
}

impl ValidateSummary {
    fn total_violations(&self) -> usize {
        self.inverted_range_count
            + self.sibling_order_violation_count
            + self.sibling_overlap_count
            + self.containment_violation_count
            + self.level_order_violation_count
    }

    fn record(&mut self, finding: String) {
        self.findings.push(finding);
    }
}

fn audit_siblings(nodes: &[TreeNode], parent: Option<&TreeNode>, summary: &mut ValidateSummary) {
    for node in nodes {
        summary.node_count += 1;
        if node.low_confidence {
            summary.low_confidence_count += 1;
        }

        if node.start > node.end {
            summary.inverted_range_count += 1;
            summary.record(format!(
                "node '{}' has inverted range [{}, {}]",
                node.title, node.start, node.end
            ));
        }

        if let Some(parent) = parent {
            if node.start < parent.start || node.end > parent.end {
                summary.containment_violation_count += 1;
                summary.record(format!(
                    "node '{}' range [{}, {}] escapes parent '{}' range [{}, {}]",
                    node.title, node.start, node.end, parent.title, parent.start, parent.end
                ));
            }

            if node.level <= parent.level {
                summary.level_order_violation_count += 1;
                summary.record(format!(
                    "node '{}' level {} does not exceed parent '{}' level {}",
                    node.title, node.level, parent.title, parent.level
                ));
            }
        }

        audit_siblings(&node.nodes, Some(node), summary);
    }

    for pair in nodes.windows(2) {
        if pair[1].start < pair[0].start {
            summary.sibling_order_violation_count += 1;
            summary.record(format!(
                "sibling '{}' starts before '{}'",
                pair[1].title, pair[0].title
            ));
        } else if pair[1].start <= pair[0].end {
            summary.sibling_overlap_count += 1;
            summary.record(format!(
                "siblings '{}' and '{}' overlap: [{}, {}] then [{}, {}]",
                pair[0].title, pair[1].title, pair[0].start, pair[0].end, pair[1].start, pair[1].end
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::cli::ValidateArgs;
    use crate::model::GenerationParams;

    fn params() -> GenerationParams {
        GenerationParams {
            model: "mock".to_string(),
            toc_check_units: 20,
            max_retries: 3,
            max_repair_rounds: 2,
            oracle_call_budget: None,
            oracle_concurrency: 4,
            min_section_chars: 64,
        }
    }

    fn node(title: &str, level: u32, start: u32, end: u32, nodes: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            node_id: "0000".to_string(),
            title: title.to_string(),
            level,
            start,
            end,
            low_confidence: false,
            summary: None,
            nodes,
        }
    }

    fn document(structure: Vec<TreeNode>) -> TreeDocument {
        TreeDocument {
            doc_name: "doc".to_string(),
            doc_id: "deadbeef".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            source_kind: "pdf".to_string(),
            unit_count: 10,
            oracle_calls_used: 0,
            description: None,
            params: params(),
            structure,
        }
    }

    fn run_against(tree: &TreeDocument) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        let data = serde_json::to_string(tree).expect("serialize");
        file.write_all(data.as_bytes()).expect("write");

        run(ValidateArgs {
            tree_path: file.path().to_path_buf(),
            report_path: None,
        })
    }

    #[test]
    fn clean_tree_passes() {
        let tree = document(vec![
            node(
                "Background",
                1,
                2,
                5,
                vec![node("Prior work", 2, 3, 5, Vec::new())],
            ),
            node("Method", 1, 6, 9, Vec::new()),
        ]);

        assert!(run_against(&tree).is_ok());
    }

    #[test]
    fn sibling_overlap_fails_validation() {
        let tree = document(vec![
            node("Background", 1, 2, 6, Vec::new()),
            node("Method", 1, 5, 9, Vec::new()),
        ]);

        let error = run_against(&tree).expect_err("overlap must fail");
        assert!(error.to_string().contains("1 violation"));
    }

    #[test]
    fn escaping_child_and_level_inversion_fail_validation() {
        let tree = document(vec![node(
            "Background",
            2,
            2,
            5,
            vec![node("Prior work", 1, 2, 7, Vec::new())],
        )]);

        let error = run_against(&tree).expect_err("bad child must fail");
        assert!(error.to_string().contains("2 violation"));
    }
}
