use serde::{Deserialize, Serialize};

/// Serialized tree index written next to the source document. `structure`
/// holds the document's top-level sections; a document with no detectable
/// structure serializes as a single document-spanning node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeDocument {
    pub doc_name: String,
    pub doc_id: String,
    pub generated_at: String,
    pub source_kind: String,
    pub unit_count: usize,
    pub oracle_calls_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub params: GenerationParams,
    pub structure: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub toc_check_units: usize,
    pub max_retries: u32,
    pub max_repair_rounds: u32,
    pub oracle_call_budget: Option<u32>,
    pub oracle_concurrency: usize,
    pub min_section_chars: usize,
}

/// One section in the serialized tree. `start`/`end` are physical anchors
/// (page numbers for PDF, line numbers for Markdown), not raw unit ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeNode {
    pub node_id: String,
    pub title: String,
    pub level: u32,
    pub start: u32,
    pub end: u32,
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub doc_path: String,
    pub doc_id: String,
    pub tree_path: String,
    pub params: GenerationParams,
    pub counts: IndexCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCounts {
    pub unit_count: usize,
    pub candidate_count: usize,
    pub node_count: usize,
    pub low_confidence_node_count: usize,
    pub merged_node_count: usize,
    pub oracle_calls_used: u64,
    pub summaries_generated: usize,
}
