//! Text-understanding oracle capability.
//!
//! The core only depends on the three operations below; transport,
//! authentication and model choice live behind the trait. An error is
//! distinct from a low-confidence judgment: errors feed the retry policy,
//! low confidence feeds the node flags.

use async_trait::async_trait;
use thiserror::Error;

pub mod client;
#[cfg(test)]
pub mod mock;
pub mod policy;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request timed out")]
    Timeout,

    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("oracle returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("oracle response was empty")]
    EmptyResponse,

    #[error("oracle response was malformed: {0}")]
    Malformed(String),

    #[error("oracle call budget exhausted")]
    BudgetExhausted,

    #[error("oracle call cancelled")]
    Cancelled,
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::EmptyResponse | Self::Malformed(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::BudgetExhausted | Self::Cancelled => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JudgmentConfidence {
    High,
    Low,
}

#[derive(Debug, Clone)]
pub struct BoundaryJudgment {
    pub unit_id: usize,
    pub confidence: JudgmentConfidence,
}

/// Side the oracle believes the true boundary lies on, relative to the
/// currently resolved start.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SpanAdjustment {
    ShiftEarlier,
    ShiftLater,
}

#[derive(Debug, Clone)]
pub struct SpanVerdict {
    pub ok: bool,
    pub suggested_adjustment: Option<SpanAdjustment>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the unit id within `window_text` (tagged with `<unit N>`
    /// markers) where the section titled `title` begins.
    async fn resolve_boundary(
        &self,
        title: &str,
        window_text: &str,
    ) -> Result<BoundaryJudgment, OracleError>;

    /// Judges whether `span_text` starts with and contains the section
    /// titled `title` without the primary content of another section.
    async fn verify_span(&self, title: &str, span_text: &str) -> Result<SpanVerdict, OracleError>;

    async fn summarize(&self, span_text: &str) -> Result<String, OracleError>;
}

/// Stand-in used for offline runs. Every call reports budget exhaustion, so
/// the pipeline takes the heuristic-only degradation path throughout.
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    async fn resolve_boundary(
        &self,
        _title: &str,
        _window_text: &str,
    ) -> Result<BoundaryJudgment, OracleError> {
        Err(OracleError::BudgetExhausted)
    }

    async fn verify_span(
        &self,
        _title: &str,
        _span_text: &str,
    ) -> Result<SpanVerdict, OracleError> {
        Err(OracleError::BudgetExhausted)
    }

    async fn summarize(&self, _span_text: &str) -> Result<String, OracleError> {
        Err(OracleError::BudgetExhausted)
    }
}
