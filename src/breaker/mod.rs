//! Circuit breaker for upstream dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since opened_at (lazy, on call)
//! Half-Open → Closed: consecutive_successes >= success_threshold
//! Half-Open → Open: any single probe failure (resets the recovery clock)
//! ```
//!
//! # Design Decisions
//! - One breaker per named dependency, shared via [`registry::BreakerRegistry`]
//! - Open → Half-Open is evaluated lazily on the call path; no background
//!   timer, so `state` outside the lock is only a view — admission is
//!   decided inside the critical section
//! - The lock is never held while the protected operation runs; probes
//!   may execute concurrently in Half-Open, bounded by `half_open_max_calls`
//! - The breaker never swallows the operation's error; it only rejects
//!   preemptively while Open

pub mod registry;

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::{BreakerError, CircuitOpenError};
use crate::observability::metrics;

/// Retry-after hint returned when a Half-Open probe slot is unavailable.
///
/// Fixed rather than computed: in Half-Open the wait is "until a probe
/// settles", which has no closed form.
const HALF_OPEN_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Observer invoked after a state transition, outside the breaker lock.
pub type TransitionListener = Box<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Mutable breaker state. All fields guarded by the breaker's mutex.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    total_rejected: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_in_flight: 0,
            opened_at: None,
            last_failure: None,
            last_success: None,
            total_failures: 0,
            total_successes: 0,
            total_rejected: 0,
        }
    }

    /// Transition to Open and (re)start the recovery clock.
    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.consecutive_successes = 0;
        self.half_open_in_flight = 0;
    }

    /// Transition to Closed, clearing recovery bookkeeping.
    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.half_open_in_flight = 0;
    }
}

/// Read-only snapshot of breaker counters and effective state.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejected: u64,
    /// Seconds since the last failed call, if any.
    pub last_failure_secs_ago: Option<f64>,
    /// Seconds since the last successful call, if any.
    pub last_success_secs_ago: Option<f64>,
    /// Seconds the breaker has been open, if currently open.
    pub open_for_secs: Option<f64>,
}

/// Per-dependency circuit breaker.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    success_threshold: u32,
    inner: Mutex<BreakerInner>,
    listener: Mutex<Option<TransitionListener>>,
}

/// Admission decision computed inside the critical section.
enum Admission {
    /// Closed: plain pass-through.
    Normal,
    /// Half-Open: counted probe, must be settled after the call.
    Probe,
}

impl CircuitBreaker {
    /// Create a breaker for the named dependency.
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            half_open_max_calls: config.half_open_max_calls.max(1),
            success_threshold: config.success_threshold.max(1),
            inner: Mutex::new(BreakerInner::new()),
            listener: Mutex::new(None),
        }
    }

    /// Dependency name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install an observer for state transitions.
    ///
    /// Invoked outside the breaker lock; a panicking listener is isolated
    /// and cannot poison the breaker.
    pub fn set_transition_listener(&self, listener: TransitionListener) {
        *self.listener.lock().expect("breaker listener mutex poisoned") = Some(listener);
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejects with [`CircuitOpenError`] while Open (or when Half-Open
    /// probe slots are exhausted) without invoking the operation. The
    /// operation runs without the breaker lock held, so calls may
    /// overlap. Its error, when it runs and fails, is returned unchanged
    /// as [`BreakerError::Inner`].
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(rejection) => return Err(BreakerError::Open(rejection)),
        };

        let result = operation().await;

        match result {
            Ok(value) => {
                self.on_success(&admission);
                Ok(value)
            }
            Err(err) => {
                self.on_failure(&admission);
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Read-only snapshot; reports the effective state without mutating.
    pub fn stats(&self) -> BreakerStats {
        let now = Instant::now();
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        BreakerStats {
            name: self.name.clone(),
            state: self.effective_state(&inner, now),
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejected: inner.total_rejected,
            last_failure_secs_ago: inner.last_failure.map(|t| (now - t).as_secs_f64()),
            last_success_secs_ago: inner.last_success.map(|t| (now - t).as_secs_f64()),
            open_for_secs: inner.opened_at.map(|t| (now - t).as_secs_f64()),
        }
    }

    /// Current effective state (view only).
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        self.effective_state(&inner, Instant::now())
    }

    /// Administrative override: force Closed regardless of history.
    ///
    /// Clears recovery counters; lifetime totals are kept for reporting.
    pub fn reset(&self) {
        let from = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            let from = inner.state;
            inner.close();
            from
        };
        if from != CircuitState::Closed {
            self.notify_transition(from, CircuitState::Closed);
        }
    }

    /// Administrative override: force Open, starting the recovery clock now.
    pub fn trip(&self) {
        let from = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            let from = inner.state;
            inner.open(Instant::now());
            from
        };
        if from != CircuitState::Open {
            self.notify_transition(from, CircuitState::Open);
        }
    }

    /// Open → Half-Open is a lazy view: authoritative only inside `admit`.
    fn effective_state(&self, inner: &BreakerInner, now: Instant) -> CircuitState {
        match inner.state {
            CircuitState::Open => match inner.opened_at {
                Some(opened_at) if now - opened_at >= self.recovery_timeout => {
                    CircuitState::HalfOpen
                }
                _ => CircuitState::Open,
            },
            other => other,
        }
    }

    /// Admission decision. Applies the authoritative Open → Half-Open
    /// transition and the probe bound inside one critical section so
    /// concurrent callers cannot over-admit.
    fn admit(&self) -> Result<Admission, CircuitOpenError> {
        let now = Instant::now();
        let (decision, transition) = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            let mut transition = None;

            if inner.state == CircuitState::Open {
                match inner.opened_at {
                    Some(opened_at) if now - opened_at >= self.recovery_timeout => {
                        inner.state = CircuitState::HalfOpen;
                        inner.consecutive_successes = 0;
                        inner.half_open_in_flight = 0;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                    }
                    Some(opened_at) => {
                        inner.total_rejected += 1;
                        drop(inner);
                        metrics::record_breaker_rejected(&self.name);
                        let elapsed = now - opened_at;
                        return Err(CircuitOpenError {
                            name: self.name.clone(),
                            retry_after: self.recovery_timeout.saturating_sub(elapsed),
                        });
                    }
                    // Open without a timestamp cannot arise from normal
                    // transitions; treat it as ready to probe.
                    None => {
                        inner.state = CircuitState::HalfOpen;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                    }
                }
            }

            let decision = match inner.state {
                CircuitState::Closed => Ok(Admission::Normal),
                CircuitState::HalfOpen => {
                    if inner.half_open_in_flight >= self.half_open_max_calls {
                        inner.total_rejected += 1;
                        Err(CircuitOpenError {
                            name: self.name.clone(),
                            retry_after: HALF_OPEN_RETRY_AFTER,
                        })
                    } else {
                        inner.half_open_in_flight += 1;
                        Ok(Admission::Probe)
                    }
                }
                CircuitState::Open => unreachable!("open handled above"),
            };
            (decision, transition)
        };

        if let Some((from, to)) = transition {
            self.notify_transition(from, to);
        }
        if decision.is_err() {
            metrics::record_breaker_rejected(&self.name);
        }
        decision
    }

    fn on_success(&self, admission: &Admission) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            if matches!(admission, Admission::Probe) {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
            inner.total_successes += 1;
            inner.last_success = Some(now);

            match inner.state {
                CircuitState::HalfOpen => {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.success_threshold {
                        inner.close();
                        Some((CircuitState::HalfOpen, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                // Closed, or Open after an admin trip raced this call:
                // a success simply clears the failure streak.
                _ => {
                    inner.consecutive_failures = 0;
                    None
                }
            }
        };
        if let Some((from, to)) = transition {
            self.notify_transition(from, to);
        }
    }

    fn on_failure(&self, admission: &Admission) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock().expect("breaker mutex poisoned");
            if matches!(admission, Admission::Probe) {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }
            inner.total_failures += 1;
            inner.last_failure = Some(now);

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.failure_threshold {
                        inner.open(now);
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                // One probe failure reopens immediately.
                CircuitState::HalfOpen => {
                    inner.open(now);
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                CircuitState::Open => None,
            }
        };
        if let Some((from, to)) = transition {
            self.notify_transition(from, to);
        }
    }

    fn notify_transition(&self, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => {
                tracing::warn!(breaker = %self.name, %from, %to, "circuit opened")
            }
            _ => tracing::info!(breaker = %self.name, %from, %to, "circuit state changed"),
        }
        metrics::record_breaker_transition(&self.name, &to.to_string());

        let listener = self.listener.lock().expect("breaker listener mutex poisoned");
        if let Some(cb) = listener.as_ref() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(from, to)));
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("half_open_max_calls", &self.half_open_max_calls)
            .field("success_threshold", &self.success_threshold)
            .finish_non_exhaustive()
    }
}
