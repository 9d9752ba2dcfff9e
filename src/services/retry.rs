//! Retry wrapper for external collaborator calls.
//!
//! Retries transient failure classes (timeouts, connection drops, rate
//! limits, 5xx-equivalent service errors) with exponential backoff and
//! jitter. Non-transient failures (auth, validation, not-found) propagate
//! immediately. Retried mutations must be idempotent; `TaskPatch` carries
//! an idempotency key for exactly that reason.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::CollaboratorError;

/// Bounded retry with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }

    /// Run `operation` until it succeeds, fails non-transiently, or the
    /// attempt budget is exhausted. The last error is returned as-is.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "collaborator call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transient collaborator error, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempt, error = %err, "retry budget exhausted");
                    } else {
                        debug!(error = %err, "non-transient error, not retrying");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Exponential backoff with jitter: `base * 2^(attempt-1)`, capped,
    /// then scaled by a factor from `[1 - jitter, 1 + jitter]`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_backoff);

        if self.jitter <= 0.0 {
            return exp;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        exp.mul_f64(factor.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
