//! Retry policy around the backend call.
//!
//! Only rate limiting and timeouts are retried. Transport errors surface
//! immediately, and parse failures never reach this layer.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use scorecard_config::RetryConfig;
use scorecard_core::EvalError;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Scale each delay by a random factor in [0.9, 1.1].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before the next attempt, after `failed` attempts have failed with `err`.
    pub fn backoff(&self, failed: u32, err: &EvalError) -> Duration {
        let base = match err {
            EvalError::RateLimited { retry_after: Some(after), .. } => *after,
            _ => {
                let exp = self.multiplier.powi(failed.saturating_sub(1) as i32);
                let secs = self.initial_backoff.as_secs_f64() * exp;
                Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
            }
        };
        let capped = base.min(self.max_backoff);

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            capped.mul_f64(factor).min(self.max_backoff)
        } else {
            capped
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. Returns the value and the attempt count.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<(T, u32), EvalError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, EvalError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt, &e);
                    warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying backend call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() && max_attempts > 1 => {
                    return Err(EvalError::RetriesExhausted { attempts: attempt, last: Box::new(e) })
                }
                Err(e) => return Err(e),
            }
        }
    }
}
