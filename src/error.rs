//! Error taxonomy for the resilience layer.
//!
//! # Design Decisions
//! - Infrastructure rejections (`CircuitOpenError`, `RateLimitExceeded`,
//!   `DeadlineExceededError`) are distinct types carrying the structured
//!   fields (`retry_after`, `duration`, dependency name) an outer HTTP
//!   layer needs for 503/429-style responses
//! - Underlying operation failures are never replaced: wrapper enums
//!   keep the caller's error type as a variant so "infrastructure said
//!   no" stays distinguishable from "the real call failed"

use std::time::Duration;
use thiserror::Error;

/// Boxed error used at type-erased seams (fallback producers, cancel hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Preemptive rejection by an open circuit breaker.
///
/// Never indicates the dependency's actual error; the caller can wait
/// `retry_after` and try again.
#[derive(Debug, Clone, Error)]
#[error("circuit '{name}' is open, retry after {retry_after:?}")]
pub struct CircuitOpenError {
    /// Name of the protected dependency.
    pub name: String,
    /// Suggested wait before the next attempt.
    pub retry_after: Duration,
}

/// The wrapped operation did not complete within its deadline.
///
/// The operation's true outcome is unknown: it may still complete (or
/// fail) later, possibly with side effects already applied.
#[derive(Debug, Clone, Error)]
#[error("deadline of {duration:?} exceeded")]
pub struct DeadlineExceededError {
    /// The effective deadline that elapsed.
    pub duration: Duration,
}

/// Client-side throttling by the sliding-window rate limiter.
#[derive(Debug, Clone, Error)]
#[error("rate limit exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    /// Time until the oldest retained request falls out of the window.
    pub retry_after: Duration,
}

/// Outcome of a breaker-guarded call.
///
/// `Inner` carries the operation's own error unchanged.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected before the operation was invoked.
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The operation ran and failed; this is its original error.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Extract the underlying operation error, if the call was admitted.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Inner(e) => Some(e),
        }
    }
}

/// Outcome of a deadline-guarded call.
#[derive(Debug, Error)]
pub enum DeadlineError<E> {
    /// The deadline fired before the operation settled.
    #[error(transparent)]
    Exceeded(#[from] DeadlineExceededError),

    /// The operation settled in time with its own error.
    #[error("{0}")]
    Inner(E),
}

impl<E> DeadlineError<E> {
    /// Extract the underlying operation error, if it settled in time.
    pub fn into_inner(self) -> Option<E> {
        match self {
            DeadlineError::Exceeded(_) => None,
            DeadlineError::Inner(e) => Some(e),
        }
    }
}
