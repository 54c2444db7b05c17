//! Transport Retry Logic
//!
//! Implements exponential backoff with jitter for transient upstream failures
//! (HTTP 429 and 5xx). Any other failure is returned immediately.

use rand::Rng;
use std::time::{Duration, Instant};

/// Errors that can tell whether retrying might help
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

/// Bounded retry policy
///
/// **Backoff Strategy:**
/// - Delay before retry `n` (0-based): `base_delay * 2^n + rand(0..=max_jitter)`
/// - At most `max_retries` retries after the first attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_jitter: Duration::from_millis(100),
        }
    }

    /// Policy with no waiting between attempts (tests)
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(retry));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        exponential + jitter
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(400))
    }
}

/// Run `operation`, retrying while it fails with a transient error
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "GET /api/v1/timelines/tag/otters")
/// * `policy` - Retry bound and backoff parameters
/// * `operation` - Async closure performing one attempt
///
/// # Returns
/// First success, the first non-transient error, or the last transient error
/// once retries are exhausted
pub async fn retry_transient<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: TransientError + std::fmt::Display,
{
    let start_time = Instant::now();
    let mut retry = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if retry > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = retry + 1,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Upstream call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    return Err(err);
                }

                if retry >= policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt = retry + 1,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %err,
                        "Upstream call failed: retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(retry);
                tracing::warn!(
                    operation = operation_name,
                    attempt = retry + 1,
                    backoff_ms = delay.as_millis(),
                    error = %err,
                    "Transient upstream failure, will retry after backoff"
                );

                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}
