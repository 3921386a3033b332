use super::*;

pub async fn run(args: IndexArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    // Input errors are the only fatal class; everything past this point
    // degrades instead of failing.
    let source = source::open_document(&args.doc_path, args.max_units)?;
    let doc_name = source.doc_name().to_string();
    let units = source.load_units()?;
    let doc_id = sha256_file(&args.doc_path)?;

    info!(
        doc = %args.doc_path.display(),
        run_id = %run_id,
        source_kind = source.kind().as_str(),
        unit_count = units.len(),
        "starting index run"
    );

    let oracle: Box<dyn Oracle> = if args.offline {
        Box::new(DisabledOracle)
    } else {
        Box::new(ChatOracle::from_env(
            &args.model,
            Duration::from_secs(args.oracle_timeout_secs),
        )?)
    };

    let retry = RetryPolicy {
        max_attempts: args.max_retries.max(1),
        base_delay: Duration::from_millis(args.retry_base_delay_ms),
    };
    let budget = match args.oracle_call_budget {
        Some(calls) => CallBudget::limited(calls),
        None => CallBudget::unlimited(),
    };
    let policy = OraclePolicy::new(retry, budget, args.oracle_concurrency);

    let cancel = CancellationToken::new();
    spawn_cancel_watcher(cancel.clone());

    let options = PipelineOptions {
        toc_check_units: args.toc_check_units,
        max_repair_rounds: args.max_repair_rounds,
        min_section_chars: args.min_section_chars,
        skip_summaries: args.skip_summaries,
        with_doc_description: args.with_doc_description,
    };

    let (root, mut counts, warnings) = build_index_tree(
        &doc_name,
        &units,
        source.kind(),
        oracle.as_ref(),
        &policy,
        &cancel,
        &options,
    )
    .await?;
    counts.oracle_calls_used = policy.calls_used();

    let params = GenerationParams {
        model: args.model.clone(),
        toc_check_units: args.toc_check_units,
        max_retries: args.max_retries,
        max_repair_rounds: args.max_repair_rounds,
        oracle_call_budget: args.oracle_call_budget,
        oracle_concurrency: args.oracle_concurrency,
        min_section_chars: args.min_section_chars,
    };

    let tree_document = build_tree_document(
        &doc_name,
        &doc_id,
        source.kind(),
        &units,
        &root,
        counts.oracle_calls_used,
        params.clone(),
    );

    let tree_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.output_dir.join(format!("{doc_name}_structure.json")));
    write_json_pretty(&tree_path, &tree_document)?;
    info!(tree = %tree_path.display(), "tree structure written");

    let manifest = IndexRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        completed_at: now_utc_string(),
        doc_path: args.doc_path.display().to_string(),
        doc_id,
        tree_path: tree_path.display().to_string(),
        params,
        counts: counts.clone(),
        warnings,
    };
    let manifest_path = args.output_dir.join(format!(
        "{}_run_{}.json",
        doc_name,
        utc_compact_string(started_ts)
    ));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        node_count = counts.node_count,
        low_confidence = counts.low_confidence_node_count,
        oracle_calls = counts.oracle_calls_used,
        "index run complete"
    );

    Ok(())
}

pub(crate) struct PipelineOptions {
    pub toc_check_units: usize,
    pub max_repair_rounds: u32,
    pub min_section_chars: usize,
    pub skip_summaries: bool,
    pub with_doc_description: bool,
}

/// Core pipeline: extract candidates, resolve boundaries, assemble, verify,
/// summarize. Always returns a best-effort tree; oracle trouble only shows
/// up as low-confidence flags. Returned warnings list any structural
/// invariant violation that survived verification (none expected).
pub(crate) async fn build_index_tree(
    doc_name: &str,
    units: &[TextUnit],
    kind: SourceKind,
    oracle: &dyn Oracle,
    policy: &OraclePolicy,
    cancel: &CancellationToken,
    options: &PipelineOptions,
) -> Result<(Node, IndexCounts, Vec<String>)> {
    let (candidates, search_floor) = extract_candidates(units, kind, options.toc_check_units)?;
    let candidate_count = candidates.len();
    info!(candidate_count, "heading candidates extracted");

    if candidate_count == 0 {
        debug!("no structural cues found, degrading to document-level node");
    }

    let resolved =
        resolve_candidates(units, candidates, search_floor, oracle, policy, cancel).await;
    let mut root = assemble_tree(doc_name, resolved, units.len());

    let verifier = Verifier {
        units,
        oracle,
        policy,
        cancel,
        max_repair_rounds: options.max_repair_rounds,
        min_section_chars: options.min_section_chars,
        merged_nodes: AtomicUsize::new(0),
    };
    verifier.verify_tree(&mut root).await;

    let violations = partition_violations(&root, units.len());
    for violation in &violations {
        error!(violation = %violation, "structural invariant violated after verification");
    }

    let mut summaries_generated = 0;
    if !options.skip_summaries {
        let summarizer = Summarizer {
            units,
            oracle,
            policy,
            cancel,
            summaries_generated: AtomicUsize::new(0),
        };
        summarizer
            .summarize_tree(&mut root, options.with_doc_description)
            .await;
        summaries_generated = summarizer.generated_count();
    }

    // A childless root serializes as a single document-level node.
    let node_count = if root.children.is_empty() {
        1
    } else {
        root.node_count() - 1
    };

    let counts = IndexCounts {
        unit_count: units.len(),
        candidate_count,
        node_count,
        low_confidence_node_count: root.low_confidence_count(),
        merged_node_count: verifier.merged_node_count(),
        oracle_calls_used: 0,
        summaries_generated,
    };

    Ok((root, counts, violations))
}

fn spawn_cancel_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested; remaining nodes resolve heuristically");
            cancel.cancel();
        }
    });
}

/// Maps the internal tree onto the serialized records: unit ids become
/// physical anchors, nodes get pre-order ids, and a childless root (a
/// document with no detected structure) serializes as the single node.
pub(crate) fn build_tree_document(
    doc_name: &str,
    doc_id: &str,
    kind: SourceKind,
    units: &[TextUnit],
    root: &Node,
    oracle_calls_used: u64,
    params: GenerationParams,
) -> crate::model::TreeDocument {
    let mut counter = 0usize;
    let structure = if root.children.is_empty() {
        vec![to_output_node(root, units, &mut counter)]
    } else {
        root.children
            .iter()
            .map(|child| to_output_node(child, units, &mut counter))
            .collect()
    };

    crate::model::TreeDocument {
        doc_name: doc_name.to_string(),
        doc_id: doc_id.to_string(),
        generated_at: now_utc_string(),
        source_kind: kind.as_str().to_string(),
        unit_count: units.len(),
        oracle_calls_used,
        description: root.summary.clone(),
        params,
        structure,
    }
}

fn to_output_node(node: &Node, units: &[TextUnit], counter: &mut usize) -> TreeNode {
    let node_id = format!("{:04}", *counter);
    *counter += 1;

    let start = units
        .get(node.start_unit)
        .map(|unit| unit.anchor)
        .unwrap_or_default();
    let end = units
        .get(node.end_unit)
        .map(|unit| unit.anchor_last)
        .unwrap_or_default();

    TreeNode {
        node_id,
        title: node.title.clone(),
        level: node.level.max(1),
        start,
        end,
        low_confidence: node.low_confidence,
        summary: node.summary.clone(),
        nodes: node
            .children
            .iter()
            .map(|child| to_output_node(child, units, counter))
            .collect(),
    }
}
