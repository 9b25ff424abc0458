//! Per-client sliding-window rate limiting.
//!
//! # Responsibilities
//! - Cap request volume per client key over a rolling time window
//! - Tell rejected clients how long to wait
//! - Bound memory across many distinct clients in a long-lived process
//!
//! # Design Decisions
//! - True sliding window (per-client timestamp queue), not fixed buckets:
//!   a burst cannot double up across a bucket boundary
//! - Evict-then-count-then-append runs under one lock so two concurrent
//!   requests cannot both observe room and both be admitted past the limit
//! - Rejected requests are not recorded, so a hammering client does not
//!   push its own window forward
//! - Idle client keys are swept every `SWEEP_EVERY_ADMISSIONS` admitted
//!   requests rather than on a timer

pub mod middleware;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::RateLimitExceeded;
use crate::observability::metrics;

/// Admissions between idle-client sweeps.
const SWEEP_EVERY_ADMISSIONS: u64 = 500;

#[derive(Debug)]
struct LimiterInner {
    clients: HashMap<String, VecDeque<Instant>>,
    admitted_since_sweep: u64,
    total_admitted: u64,
    total_rejected: u64,
}

/// Counters and map size for the health-reporting surface.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub tracked_clients: usize,
    pub total_admitted: u64,
    pub total_rejected: u64,
}

/// Sliding-window admission control keyed by client.
pub struct SlidingWindowRateLimiter {
    inner: Mutex<LimiterInner>,
    window: Duration,
    max_requests: usize,
}

impl SlidingWindowRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            inner: Mutex::new(LimiterInner {
                clients: HashMap::new(),
                admitted_since_sweep: 0,
                total_admitted: 0,
                total_rejected: 0,
            }),
            window: Duration::from_secs(config.window_secs.max(1)),
            max_requests: config.max_requests_per_window.max(1) as usize,
        }
    }

    /// Admit or reject one request for `client_key`.
    ///
    /// On rejection, `retry_after` is the time until the oldest retained
    /// request falls outside the window, rounded up to whole seconds,
    /// minimum one second.
    pub fn allow(&self, client_key: &str) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");

        let timestamps = inner
            .clients
            .entry(client_key.to_string())
            .or_insert_with(VecDeque::new);

        // Evict everything that has rolled out of the trailing window.
        while let Some(&oldest) = timestamps.front() {
            if now - oldest >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            let oldest = *timestamps.front().expect("non-empty at limit");
            let retry_after = round_up_secs(self.window - (now - oldest));
            inner.total_rejected += 1;
            metrics::record_rate_limited("window_limit");
            return Err(RateLimitExceeded { retry_after });
        }

        timestamps.push_back(now);
        inner.total_admitted += 1;
        inner.admitted_since_sweep += 1;
        if inner.admitted_since_sweep >= SWEEP_EVERY_ADMISSIONS {
            inner.admitted_since_sweep = 0;
            let window = self.window;
            inner
                .clients
                .retain(|_, q| q.back().is_some_and(|&last| now - last < window));
        }
        Ok(())
    }

    /// Snapshot of limiter counters.
    pub fn stats(&self) -> RateLimiterStats {
        let inner = self.inner.lock().expect("rate limiter mutex poisoned");
        RateLimiterStats {
            tracked_clients: inner.clients.len(),
            total_admitted: inner.total_admitted,
            total_rejected: inner.total_rejected,
        }
    }
}

/// Round up to whole seconds, minimum one.
fn round_up_secs(d: Duration) -> Duration {
    let secs = d.as_secs_f64().ceil().max(1.0);
    Duration::from_secs(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_secs: u64) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(&RateLimitConfig {
            enabled: true,
            max_requests_per_window: max,
            window_secs,
            skip_paths: Vec::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_then_rejects() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            limiter.allow("1.2.3.4").expect("within limit");
        }
        let rejected = limiter.allow("1.2.3.4").unwrap_err();
        assert!(rejected.retry_after >= Duration::from_secs(1));
        assert_eq!(limiter.stats().total_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_over() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            limiter.allow("1.2.3.4").expect("within limit");
        }
        // Rejected mid-window with a meaningful retry hint.
        tokio::time::advance(Duration::from_secs(10)).await;
        let rejected = limiter.allow("1.2.3.4").unwrap_err();
        assert_eq!(rejected.retry_after, Duration::from_secs(50));

        // Fully rolled over.
        tokio::time::advance(Duration::from_secs(51)).await;
        limiter.allow("1.2.3.4").expect("window rolled over");
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_retry_after_readmits() {
        let limiter = limiter(2, 30);
        limiter.allow("c").expect("first");
        limiter.allow("c").expect("second");
        let rejected = limiter.allow("c").unwrap_err();
        tokio::time::advance(rejected.retry_after).await;
        limiter.allow("c").expect("admitted after waiting retry_after");
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_does_not_consume_window_space() {
        let limiter = limiter(1, 60);
        limiter.allow("c").expect("first");
        for _ in 0..10 {
            assert!(limiter.allow("c").is_err());
        }
        // Only the single admitted request occupies the window.
        tokio::time::advance(Duration::from_secs(60)).await;
        limiter.allow("c").expect("admitted once the one entry expired");
    }

    #[tokio::test(start_paused = true)]
    async fn clients_are_isolated() {
        let limiter = limiter(1, 60);
        limiter.allow("a").expect("a");
        limiter.allow("b").expect("b is a different client");
        assert!(limiter.allow("a").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_clients_are_swept() {
        let limiter = limiter(10_000, 1);
        limiter.allow("idle-client").expect("admitted");
        tokio::time::advance(Duration::from_secs(2)).await;

        // Drive enough admissions from another client to trigger a sweep.
        for _ in 0..SWEEP_EVERY_ADMISSIONS {
            limiter.allow("busy-client").expect("admitted");
        }
        assert_eq!(limiter.stats().tracked_clients, 1);
    }
}
