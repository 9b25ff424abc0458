//! Resilience and rate-shaping middleware for unreliable upstream
//! dependencies.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                 UPSTREAM GUARD                    │
//!                 │                                                   │
//!  outbound call  │  ┌──────────┐   ┌────────┐   ┌─────────────┐     │
//!  ───────────────┼─▶│ breaker  │──▶│ retry  │──▶│  deadline   │─────┼──▶ upstream
//!                 │  │ registry │   │backoff │   │  enforcer   │     │    (market data,
//!                 │  └──────────┘   └────────┘   └─────────────┘     │     LLM, cache)
//!                 │        │                           │             │
//!                 │        ▼                           ▼             │
//!                 │  ┌──────────┐              ┌─────────────┐       │
//!                 │  │ degrade  │◀─────────────│ cancel hook │       │
//!                 │  │ fallback │  on failure  │ best-effort │       │
//!                 │  └──────────┘              └─────────────┘       │
//!                 │                                                   │
//!  inbound req    │  ┌───────────────────┐                            │
//!  ───────────────┼─▶│ rate_limit        │  sliding window, per       │
//!                 │  │ middleware        │  client, 429 + Retry-After │
//!                 │  └───────────────────┘                            │
//!                 └──────────────────────────────────────────────────┘
//! ```
//!
//! Outbound calls to an unreliable dependency go through a named
//! [`breaker::CircuitBreaker`], optionally with [`retry::with_retry`]
//! around the attempt sequence and [`deadline::DeadlineEnforcer`] around
//! each attempt. [`degrade::DegradationManager`] can substitute a
//! registered fallback when the primary ultimately fails. Independently,
//! [`rate_limit`] throttles inbound request volume per client.
//!
//! All state is process-local; nothing persists across restarts.

// Core components
pub mod breaker;
pub mod deadline;
pub mod degrade;
pub mod rate_limit;
pub mod retry;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use breaker::registry::BreakerRegistry;
pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use config::ResilienceConfig;
pub use deadline::{CancelHook, DeadlineEnforcer};
pub use degrade::DegradationManager;
pub use error::{
    BoxError, BreakerError, CircuitOpenError, DeadlineError, DeadlineExceededError,
    RateLimitExceeded,
};
pub use rate_limit::SlidingWindowRateLimiter;
pub use retry::{with_retry, with_retry_filtered, RetryPolicy};
