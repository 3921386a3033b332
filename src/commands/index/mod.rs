use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cli::IndexArgs;
use crate::model::{GenerationParams, IndexCounts, IndexRunManifest, TreeNode};
use crate::oracle::policy::{CallBudget, OraclePolicy, RetryPolicy};
use crate::oracle::{DisabledOracle, JudgmentConfidence, Oracle, SpanAdjustment, client::ChatOracle};
use crate::source::{self, SourceKind, TextUnit, unit_for_anchor};
use crate::tree::{HeadingCandidate, Node, ResolvedCandidate, partition_violations};
use crate::util::{
    condense_whitespace, now_utc_string, sha256_file, truncate_chars, utc_compact_string,
    write_json_pretty,
};

const WINDOW_UNIT_TEXT_CAP: usize = 2_000;
const VERIFY_SPAN_CHAR_CAP: usize = 6_000;
const SUMMARY_CHUNK_CHAR_CAP: usize = 20_000;

mod assemble;
mod extract;
mod resolve;
mod run;
mod summarize;
mod verify;

pub use run::run;

use assemble::*;
use extract::*;
use resolve::*;
use run::*;
use summarize::*;
use verify::*;

/// Concatenated text of the unit span `[start, end]`, truncated to
/// `char_cap` characters.
pub(crate) fn span_excerpt(units: &[TextUnit], start: usize, end: usize, char_cap: usize) -> String {
    let mut out = String::new();
    for unit in units.iter().take(end + 1).skip(start) {
        let text = unit.text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(text);
        if out.chars().count() >= char_cap {
            break;
        }
    }

    if out.chars().count() > char_cap {
        truncate_chars(&out, char_cap).to_string()
    } else {
        out
    }
}
