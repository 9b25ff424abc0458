//! Deadline enforcement for upstream calls.
//!
//! # Responsibilities
//! - Bound how long a caller waits for an operation
//! - Distinguish slow-but-completed calls from timed-out calls
//! - On timeout, fire a best-effort remote cancellation hook
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the caller's wait is cancelled
//!   immediately and reliably
//! - The underlying operation is not guaranteed to stop: remote
//!   cancellation via the handle is a secondary, best-effort action
//!   whose failures are logged and never raised
//! - Timeout errors are distinct from operation errors
//! - A timed-out operation's eventual result, if it ever arrives, is
//!   discarded; it is never unified with the timeout error

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::DeadlineConfig;
use crate::error::{BoxError, DeadlineError, DeadlineExceededError};
use crate::observability::metrics;

/// Upper bound on how long a cancellation attempt may extend the call.
const CANCEL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort remote cancellation, keyed by an opaque handle supplied
/// by the caller (e.g. a backend connection or session identifier).
///
/// The enforcer does not interpret the handle; it only forwards it here
/// when a call times out.
pub trait CancelHook: Send + Sync {
    fn cancel<'a>(&'a self, handle: &'a str) -> BoxFuture<'a, Result<(), BoxError>>;
}

/// Slow/timeout counters for the health-reporting surface.
#[derive(Debug, Clone, Serialize)]
pub struct DeadlineStats {
    /// Calls that completed but exceeded the slow threshold.
    pub slow_calls: u64,
    /// Calls that hit their deadline.
    pub timed_out_calls: u64,
}

/// Wraps upstream calls with a clamped timeout and cancellation hook.
pub struct DeadlineEnforcer {
    timeout: Duration,
    slow_threshold: Duration,
    max_timeout: Duration,
    cancel_on_timeout: bool,
    cancel_hook: Option<Arc<dyn CancelHook>>,
    slow_calls: AtomicU64,
    timed_out_calls: AtomicU64,
}

impl DeadlineEnforcer {
    pub fn new(config: &DeadlineConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            slow_threshold: Duration::from_secs(config.slow_threshold_secs),
            max_timeout: Duration::from_secs(config.max_timeout_secs),
            cancel_on_timeout: config.cancel_on_timeout,
            cancel_hook: None,
            slow_calls: AtomicU64::new(0),
            timed_out_calls: AtomicU64::new(0),
        }
    }

    /// Install the remote cancellation hook.
    pub fn with_cancel_hook(mut self, hook: Arc<dyn CancelHook>) -> Self {
        self.cancel_hook = Some(hook);
        self
    }

    /// The configured default timeout.
    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` with this enforcer's default timeout.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: F,
        label: &str,
        cancel_handle: Option<&str>,
    ) -> Result<T, DeadlineError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.execute_with_timeout(operation, self.timeout, label, cancel_handle)
            .await
    }

    /// Run `operation` bounded by `timeout` (clamped to the configured
    /// hard ceiling).
    ///
    /// Completed-but-slow calls and timed-out calls are counted
    /// separately. On timeout, if cancellation is enabled and both a
    /// hook and a handle are present, a cancellation request is issued
    /// against the remote resource; its failure is logged, never raised.
    pub async fn execute_with_timeout<T, E, F, Fut>(
        &self,
        operation: F,
        timeout: Duration,
        label: &str,
        cancel_handle: Option<&str>,
    ) -> Result<T, DeadlineError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let effective = timeout.min(self.max_timeout);
        let started = Instant::now();

        match tokio::time::timeout(effective, operation()).await {
            Ok(result) => {
                let elapsed = started.elapsed();
                if elapsed >= self.slow_threshold {
                    self.slow_calls.fetch_add(1, Ordering::Relaxed);
                    metrics::record_slow_call(label);
                    tracing::warn!(
                        call = label,
                        elapsed_ms = elapsed.as_millis() as u64,
                        threshold_ms = self.slow_threshold.as_millis() as u64,
                        "slow upstream call"
                    );
                }
                result.map_err(DeadlineError::Inner)
            }
            Err(_) => {
                self.timed_out_calls.fetch_add(1, Ordering::Relaxed);
                metrics::record_timeout(label);
                tracing::warn!(
                    call = label,
                    timeout_ms = effective.as_millis() as u64,
                    "upstream call timed out"
                );

                if self.cancel_on_timeout {
                    if let (Some(hook), Some(handle)) = (self.cancel_hook.as_ref(), cancel_handle)
                    {
                        self.try_cancel(hook.as_ref(), handle, label).await;
                    }
                }

                Err(DeadlineError::Exceeded(DeadlineExceededError {
                    duration: effective,
                }))
            }
        }
    }

    /// Snapshot of slow/timeout counters.
    pub fn stats(&self) -> DeadlineStats {
        DeadlineStats {
            slow_calls: self.slow_calls.load(Ordering::Relaxed),
            timed_out_calls: self.timed_out_calls.load(Ordering::Relaxed),
        }
    }

    async fn try_cancel(&self, hook: &dyn CancelHook, handle: &str, label: &str) {
        match tokio::time::timeout(CANCEL_ATTEMPT_TIMEOUT, hook.cancel(handle)).await {
            Ok(Ok(())) => {
                tracing::info!(call = label, handle, "remote cancellation requested");
            }
            Ok(Err(e)) => {
                tracing::warn!(call = label, handle, error = %e, "remote cancellation failed");
            }
            Err(_) => {
                tracing::warn!(call = label, handle, "remote cancellation attempt timed out");
            }
        }
    }
}

/// Bound a bare future with `duration`, without counters or cancellation.
pub async fn with_timeout<T, E, Fut>(duration: Duration, future: Fut) -> Result<T, DeadlineError<E>>
where
    Fut: std::future::Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DeadlineError::Inner(e)),
        Err(_) => Err(DeadlineError::Exceeded(DeadlineExceededError { duration })),
    }
}
