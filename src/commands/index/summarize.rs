use super::*;

/// Attaches a short abstract to every section node. Failures and budget
/// exhaustion leave `summary` unset and never fail the run.
pub(crate) struct Summarizer<'a> {
    pub units: &'a [TextUnit],
    pub oracle: &'a dyn Oracle,
    pub policy: &'a OraclePolicy,
    pub cancel: &'a CancellationToken,
    pub summaries_generated: AtomicUsize,
}

impl<'a> Summarizer<'a> {
    pub(crate) async fn summarize_tree(&self, root: &mut Node, with_doc_description: bool) {
        if root.children.is_empty() {
            // No detectable structure: document-level summary only.
            root.summary = self.summarize_span(root.start_unit, root.end_unit).await;
            if root.summary.is_some() {
                self.summaries_generated.fetch_add(1, Ordering::SeqCst);
            }
            return;
        }

        self.summarize_children(root).await;

        if with_doc_description {
            root.summary = self.describe_document(root).await;
        }
    }

    pub(crate) fn generated_count(&self) -> usize {
        self.summaries_generated.load(Ordering::SeqCst)
    }

    fn summarize_children<'b>(&'b self, parent: &'b mut Node) -> BoxFuture<'b, ()> {
        async move {
            let children = std::mem::take(&mut parent.children);
            let done = join_all(children.into_iter().map(|mut child| async move {
                child.summary = self.summarize_span(child.start_unit, child.end_unit).await;
                if child.summary.is_some() {
                    self.summaries_generated.fetch_add(1, Ordering::SeqCst);
                }
                self.summarize_children(&mut child).await;
                child
            }))
            .await;
            parent.children = done;
        }
        .boxed()
    }

    /// Spans above the oracle's input limit are chunked, summarized piecewise
    /// and compressed with one final pass over the concatenation.
    async fn summarize_span(&self, start_unit: usize, end_unit: usize) -> Option<String> {
        if self.cancel.is_cancelled() || self.policy.budget_exhausted() {
            return None;
        }

        let text = span_excerpt(self.units, start_unit, end_unit, usize::MAX);
        let chunks = chunk_text(&text, SUMMARY_CHUNK_CHAR_CAP);

        match chunks.len() {
            0 => None,
            1 => self.summarize_chunk(&chunks[0]).await,
            _ => {
                let mut partials = Vec::<String>::with_capacity(chunks.len());
                for chunk in &chunks {
                    partials.push(self.summarize_chunk(chunk).await?);
                }
                self.summarize_chunk(&partials.join("\n")).await
            }
        }
    }

    async fn summarize_chunk(&self, chunk: &str) -> Option<String> {
        match self
            .policy
            .call("summarize", || self.oracle.summarize(chunk))
            .await
        {
            Ok(summary) => Some(summary),
            Err(error) => {
                debug!(error = %error, "summary generation skipped");
                None
            }
        }
    }

    /// Document-level description built from the top sections' outline.
    async fn describe_document(&self, root: &Node) -> Option<String> {
        let outline = root
            .children
            .iter()
            .map(|child| match &child.summary {
                Some(summary) => format!("{}: {}", child.title, summary),
                None => child.title.clone(),
            })
            .collect::<Vec<String>>()
            .join("\n");

        if outline.trim().is_empty() {
            return None;
        }

        self.summarize_chunk(&outline).await
    }
}

/// Splits text into chunks of at most `cap` characters, preferring blank
/// line boundaries; an oversized paragraph is hard-split.
pub(crate) fn chunk_text(text: &str, cap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= cap {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::<String>::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for paragraph in trimmed.split("\n\n") {
        let mut remainder = paragraph.trim();
        if remainder.is_empty() {
            continue;
        }

        loop {
            let piece = truncate_chars(remainder, cap);
            let piece_chars = piece.chars().count();

            if current_chars > 0 && current_chars + piece_chars > cap {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(piece);
            current_chars += piece_chars;

            if piece.len() == remainder.len() {
                break;
            }
            remainder = &remainder[piece.len()..];
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
