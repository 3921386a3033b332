use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerifyState {
    Unverified,
    Checking,
    Verified,
    NeedsRepair,
}

/// Walks the assembled tree and confirms, per node, that the resolved span
/// actually holds that section's content. Mismatches route back into
/// boundary resolution over a narrowed window for a bounded number of
/// repair rounds; a node that never reaches `Verified` is accepted with the
/// low-confidence flag instead of blocking the run. Sibling subtrees are
/// verified concurrently; each task owns its subtree, and parents re-impose
/// the contiguous partition after any repair.
pub(crate) struct Verifier<'a> {
    pub units: &'a [TextUnit],
    pub oracle: &'a dyn Oracle,
    pub policy: &'a OraclePolicy,
    pub cancel: &'a CancellationToken,
    pub max_repair_rounds: u32,
    pub min_section_chars: usize,
    pub merged_nodes: AtomicUsize,
}

impl<'a> Verifier<'a> {
    pub(crate) async fn verify_tree(&self, root: &mut Node) {
        self.verify_children(root).await;
    }

    pub(crate) fn merged_node_count(&self) -> usize {
        self.merged_nodes.load(Ordering::SeqCst)
    }

    fn verify_children<'b>(&'b self, parent: &'b mut Node) -> BoxFuture<'b, ()> {
        async move {
            if parent.children.is_empty() {
                return;
            }

            if self.cancel.is_cancelled() || self.policy.budget_exhausted() {
                mark_descendants_low_confidence(parent);
                return;
            }

            // Check each direct child's own boundary concurrently; their
            // windows are disjoint by construction.
            let children = std::mem::take(&mut parent.children);
            let checked = join_all(children.into_iter().map(|mut child| async move {
                self.check_node(&mut child).await;
                child
            }))
            .await;
            parent.children = checked;

            // Repairs may have moved starts; restore the partition before
            // descending so the children's windows are final.
            self.repair_partition(parent);
            self.merge_small_children(parent);
            for child in &mut parent.children {
                self.clip_descendants(child);
            }

            let children = std::mem::take(&mut parent.children);
            let verified = join_all(children.into_iter().map(|mut child| async move {
                self.verify_children(&mut child).await;
                child
            }))
            .await;
            parent.children = verified;
        }
        .boxed()
    }

    /// Per-node state machine: `Unverified -> Checking -> {Verified,
    /// NeedsRepair}`, with `NeedsRepair` re-resolving over a halved window
    /// biased toward the side the oracle indicated.
    pub(crate) async fn check_node(&self, node: &mut Node) {
        let mut state = VerifyState::Unverified;
        let mut window = SearchWindow {
            first_unit: node.start_unit,
            last_unit: node.end_unit,
        };

        for round in 0..=self.max_repair_rounds {
            if self.cancel.is_cancelled() || self.policy.budget_exhausted() {
                break;
            }

            state = VerifyState::Checking;
            let span_text = span_excerpt(
                self.units,
                node.start_unit,
                node.end_unit,
                VERIFY_SPAN_CHAR_CAP,
            );

            match self
                .policy
                .call("verify_span", || {
                    self.oracle.verify_span(&node.title, &span_text)
                })
                .await
            {
                Ok(verdict) if verdict.ok => {
                    state = VerifyState::Verified;
                    break;
                }
                Ok(verdict) => {
                    state = VerifyState::NeedsRepair;
                    if round == self.max_repair_rounds {
                        break;
                    }

                    window = window
                        .narrowed(node.start_unit, verdict.suggested_adjustment)
                        .bounded(self.units.len().saturating_sub(1));
                    let resolution = resolve_candidate(
                        self.units,
                        &node.title,
                        node.start_unit,
                        window,
                        self.oracle,
                        self.policy,
                        self.cancel,
                    )
                    .await;

                    let repaired_start = resolution.resolved_start.min(node.end_unit);
                    if repaired_start != node.start_unit {
                        debug!(
                            title = %node.title,
                            from = node.start_unit,
                            to = repaired_start,
                            "repaired node start"
                        );
                        node.start_unit = repaired_start;
                    }
                }
                Err(error) => {
                    warn!(title = %node.title, error = %error, "span verification unavailable");
                    break;
                }
            }
        }

        node.low_confidence = state != VerifyState::Verified;
    }

    /// Re-imposes the contiguous sibling partition after boundary repairs:
    /// children are clamped into the parent span, a child whose start no
    /// longer precedes a later sibling's loses the contested span entirely,
    /// and each end is pinned to the next sibling's start.
    pub(crate) fn repair_partition(&self, parent: &mut Node) {
        if parent.children.is_empty() {
            return;
        }

        let children = std::mem::take(&mut parent.children);
        let mut kept: Vec<Node> = Vec::new();

        for mut child in children {
            child.start_unit = child.start_unit.clamp(parent.start_unit, parent.end_unit);

            while kept
                .last()
                .is_some_and(|prev| prev.start_unit >= child.start_unit)
            {
                if let Some(dropped) = kept.pop() {
                    warn!(
                        title = %dropped.title,
                        "dropping node shadowed after boundary repair"
                    );
                    self.merged_nodes.fetch_add(1, Ordering::SeqCst);
                }
            }
            kept.push(child);
        }

        let count = kept.len();
        for index in 0..count {
            let next_start = if index + 1 < count {
                kept[index + 1].start_unit
            } else {
                parent.end_unit + 1
            };
            kept[index].end_unit = next_start - 1;
        }

        parent.children = kept;
    }

    /// Folds nodes whose span holds no real content into the nearest
    /// sibling (previous preferred, next otherwise); a degenerate only
    /// child dissolves into its parent. Only leaves are folded.
    pub(crate) fn merge_small_children(&self, parent: &mut Node) {
        if parent.children.is_empty() {
            return;
        }

        let children = std::mem::take(&mut parent.children);
        let mut result: Vec<Node> = Vec::new();

        for child in children {
            if self.is_degenerate(&child) {
                if let Some(prev) = result.last_mut() {
                    debug!(
                        title = %child.title,
                        into = %prev.title,
                        "merging undersized node into previous sibling"
                    );
                    prev.end_unit = child.end_unit;
                    self.merged_nodes.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
            }
            result.push(child);
        }

        if result.len() >= 2 && self.is_degenerate(&result[0]) {
            let removed = result.remove(0);
            debug!(
                title = %removed.title,
                into = %result[0].title,
                "merging undersized node into next sibling"
            );
            result[0].start_unit = removed.start_unit;
            self.merged_nodes.fetch_add(1, Ordering::SeqCst);
        }

        if result.len() == 1 && self.is_degenerate(&result[0]) {
            if let Some(removed) = result.pop() {
                debug!(
                    title = %removed.title,
                    into = %parent.title,
                    "dissolving undersized only child into parent"
                );
                self.merged_nodes.fetch_add(1, Ordering::SeqCst);
            }
        }

        parent.children = result;
    }

    fn is_degenerate(&self, node: &Node) -> bool {
        node.children.is_empty() && self.span_chars(node) < self.min_section_chars
    }

    fn span_chars(&self, node: &Node) -> usize {
        self.units
            .iter()
            .take(node.end_unit + 1)
            .skip(node.start_unit)
            .map(|unit| unit.text.trim().chars().count())
            .sum()
    }

    /// Clamps grandchildren back into spans that shrank during repair.
    fn clip_descendants(&self, node: &mut Node) {
        if node.children.is_empty() {
            return;
        }
        self.repair_partition(node);
        for child in &mut node.children {
            self.clip_descendants(child);
        }
    }
}

fn mark_descendants_low_confidence(parent: &mut Node) {
    for child in &mut parent.children {
        child.low_confidence = true;
        mark_descendants_low_confidence(child);
    }
}
