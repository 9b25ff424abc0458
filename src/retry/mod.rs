//! Retry with exponential backoff and jitter.
//!
//! # Responsibilities
//! - Re-attempt idempotent operations on transient failure
//! - Compute capped exponential delays, jittered to avoid retry storms
//! - Classify which failures are worth retrying
//!
//! # Design Decisions
//! - The final attempt's error propagates unmodified; retries never
//!   wrap or replace the operation's error type
//! - Jitter multiplies the delay by a uniform factor in [0.5, 1.0]
//! - Delays are floored at 1ms so jitter can never collapse a delay to
//!   zero and busy-loop
//! - The backoff sleep is a plain `tokio::time::sleep`, cancelled with
//!   the surrounding task
//! - The optional retry observer is isolated: a panicking observer
//!   cannot shadow the retry path

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Retry behavior for one call site. Immutable once built.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first try; 1 means no retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Per-retry growth factor.
    pub exponential_base: f64,
    /// Randomize delays to decorrelate concurrent retriers.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            exponential_base: config.exponential_base,
            jitter: config.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Observer invoked before each retry sleep with
/// `(attempt_number, failure, delay)`.
pub type RetryObserver<'a, E> = &'a (dyn Fn(u32, &E, Duration) + Send + Sync);

/// Delay before the retry following attempt number `attempt` (1-based).
///
/// `min(base_delay * exponential_base^(attempt-1), max_delay)`, then
/// jittered, then floored at 1ms.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    // Growth saturates well before the cap matters; clamp the exponent
    // so powi cannot be fed an overflowing cast.
    let exponent = attempt.saturating_sub(1).min(64) as i32;
    let grown = policy.base_delay.as_secs_f64() * policy.exponential_base.powi(exponent);
    let capped = grown.min(policy.max_delay.as_secs_f64());

    let jittered = if policy.jitter {
        capped * rand::thread_rng().gen_range(0.5..=1.0)
    } else {
        capped
    };

    Duration::from_secs_f64(jittered.max(0.0)).max(Duration::from_millis(1))
}

/// Retry `operation` per `policy`, treating every failure as retryable.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    with_retry_filtered(policy, |_: &E| true, None, operation).await
}

/// Retry `operation` per `policy`, retrying only failures `retryable`
/// classifies as transient.
///
/// On the final attempt, or on a non-retryable failure, the operation's
/// error is returned as-is.
pub async fn with_retry_filtered<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    retryable: C,
    observer: Option<RetryObserver<'_, E>>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !retryable(&err) {
                    return Err(err);
                }
                let delay = backoff_delay(policy, attempt);
                tracing::debug!(attempt, ?delay, "retrying after transient failure");
                if let Some(observer) = observer {
                    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        observer(attempt, &err, delay)
                    }));
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
