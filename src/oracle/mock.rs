//! Deterministic scripted oracle for tests. Answers are a pure function of
//! the configured script and the inputs, so repeated runs produce identical
//! trees.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{
    BoundaryJudgment, JudgmentConfidence, Oracle, OracleError, SpanAdjustment, SpanVerdict,
};

#[derive(Debug, Default)]
pub struct ScriptedOracle {
    boundary_answers: HashMap<String, usize>,
    adjustment: Option<SpanAdjustment>,
    reject_once: Mutex<Vec<String>>,
    always_timeout: bool,
    pub resolve_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
}

impl ScriptedOracle {
    /// Verifies every span and summarizes deterministically.
    pub fn verifying() -> Self {
        Self::default()
    }

    /// Times out on every call, exercising the full retry-then-degrade path.
    pub fn always_timeout() -> Self {
        Self {
            always_timeout: true,
            ..Self::default()
        }
    }

    pub fn with_boundary(mut self, title: &str, unit_id: usize) -> Self {
        self.boundary_answers.insert(title.to_string(), unit_id);
        self
    }

    /// Rejects the first span check for the given title, suggesting the
    /// given side; later checks of the same title verify clean.
    pub fn rejecting(self, title: &str, adjustment: Option<SpanAdjustment>) -> Self {
        self.reject_once
            .lock()
            .expect("reject list poisoned")
            .push(title.to_string());
        Self { adjustment, ..self }
    }

    pub fn resolve_call_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn verify_call_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_call_count(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }
}

pub fn deterministic_summary(span_text: &str) -> String {
    let head = span_text
        .split_whitespace()
        .take(6)
        .collect::<Vec<&str>>()
        .join(" ");
    format!("Covers: {}", head)
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn resolve_boundary(
        &self,
        title: &str,
        window_text: &str,
    ) -> Result<BoundaryJudgment, OracleError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.always_timeout {
            return Err(OracleError::Timeout);
        }

        if let Some(unit_id) = self.boundary_answers.get(title) {
            return Ok(BoundaryJudgment {
                unit_id: *unit_id,
                confidence: JudgmentConfidence::High,
            });
        }

        // Fall back to the first tagged unit in the window.
        let first_tagged = window_text
            .lines()
            .find_map(|line| {
                line.strip_prefix("<unit ")
                    .and_then(|rest| rest.strip_suffix('>'))
                    .and_then(|digits| digits.parse::<usize>().ok())
            })
            .ok_or_else(|| OracleError::Malformed("window has no unit tags".to_string()))?;

        Ok(BoundaryJudgment {
            unit_id: first_tagged,
            confidence: JudgmentConfidence::Low,
        })
    }

    async fn verify_span(&self, title: &str, _span_text: &str) -> Result<SpanVerdict, OracleError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.always_timeout {
            return Err(OracleError::Timeout);
        }

        let mut reject_once = self.reject_once.lock().expect("reject list poisoned");
        if let Some(position) = reject_once.iter().position(|t| t == title) {
            reject_once.remove(position);
            return Ok(SpanVerdict {
                ok: false,
                suggested_adjustment: self.adjustment,
            });
        }

        Ok(SpanVerdict {
            ok: true,
            suggested_adjustment: None,
        })
    }

    async fn summarize(&self, span_text: &str) -> Result<String, OracleError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        if self.always_timeout {
            return Err(OracleError::Timeout);
        }

        Ok(deterministic_summary(span_text))
    }
}
