//! Retry, throttling and budget policy around oracle calls, kept separate
//! from the transport so it can be exercised against scripted oracles.

use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use super::OracleError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(6))
    }
}

/// Per-run cap on oracle calls. A charge is taken once per logical call;
/// retries of a failed attempt do not charge again.
#[derive(Debug)]
pub struct CallBudget {
    remaining: AtomicI64,
    used: AtomicU64,
}

impl CallBudget {
    pub fn limited(calls: u32) -> Self {
        Self {
            remaining: AtomicI64::new(i64::from(calls)),
            used: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            remaining: AtomicI64::new(i64::MAX),
            used: AtomicU64::new(0),
        }
    }

    pub fn try_charge(&self) -> bool {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            self.used.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            self.remaining.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) <= 0
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }
}

pub struct OraclePolicy {
    retry: RetryPolicy,
    budget: CallBudget,
    limiter: Semaphore,
}

impl OraclePolicy {
    pub fn new(retry: RetryPolicy, budget: CallBudget, concurrency: usize) -> Self {
        Self {
            retry,
            budget,
            limiter: Semaphore::new(concurrency.max(1)),
        }
    }

    pub fn calls_used(&self) -> u64 {
        self.budget.used()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.budget.exhausted()
    }

    /// Runs one logical oracle call under the concurrency cap, retrying
    /// retryable failures with exponential backoff up to the attempt bound.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, OracleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        if !self.budget.try_charge() {
            return Err(OracleError::BudgetExhausted);
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| OracleError::Cancelled)?;

        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "oracle call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn policy(max_attempts: u32, budget: CallBudget) -> OraclePolicy {
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        };
        OraclePolicy::new(retry, budget, 2)
    }

    #[test]
    fn delay_for_doubles_per_attempt() {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };

        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_up_to_bound() {
        let policy = policy(3, CallBudget::unlimited());
        let attempts = AtomicUsize::new(0);

        let result: Result<(), OracleError> = policy
            .call("test", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(OracleError::Timeout) }
            })
            .await;

        assert!(matches!(result, Err(OracleError::Timeout)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let policy = policy(3, CallBudget::unlimited());
        let attempts = AtomicUsize::new(0);

        let result: Result<(), OracleError> = policy
            .call("test", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(OracleError::Api {
                        status: 400,
                        body: "bad request".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(OracleError::Api { status: 400, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_skips_the_call_entirely() {
        let policy = policy(3, CallBudget::limited(1));
        let attempts = AtomicUsize::new(0);

        let first: Result<u32, OracleError> = policy
            .call("test", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        let second: Result<u32, OracleError> = policy
            .call("test", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(OracleError::BudgetExhausted)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(policy.calls_used(), 1);
        assert!(policy.budget_exhausted());
    }
}
