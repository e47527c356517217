//! Bounded retry with backoff for brain invocations
//!
//! Parsing, timeout and transport failures are retried up to the configured
//! bound; invariant violations and role mismatches pass through untouched.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::ExecutionConfig;
use crate::error::OrchestrationError;
use crate::Result;

/// Enforce a deadline on one external call. A timeout is reported as a
/// retryable [`OrchestrationError::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(OrchestrationError::Timeout(format!(
            "{} exceeded {:.0?}",
            what, limit
        ))),
    }
}

/// Run `attempt_fn` up to `max_retries + 1` times. The closure receives the
/// 1-based attempt number so callers can vary the prompt between attempts
/// (the planner's clarifying re-prompt). Non-retryable errors return
/// immediately; the last error is returned once attempts are exhausted.
pub async fn with_retries<T, F, Fut>(
    config: &ExecutionConfig,
    what: &str,
    attempt_fn: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = config.retry_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                warn!(
                    what,
                    attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Retryable failure, backing off"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(config.backoff_multiplier);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
