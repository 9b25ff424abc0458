//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience layer. All types derive Serde traits for deserialization
//! from config files, and all fields have defaults so a minimal config
//! is valid.

use serde::{Deserialize, Serialize};

/// Root configuration for the resilience layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Circuit breaker thresholds, shared by breakers created without
    /// an explicit override.
    pub breaker: CircuitBreakerConfig,

    /// Retry/backoff defaults.
    pub retry: RetryConfig,

    /// Deadline enforcement settings.
    pub deadline: DeadlineConfig,

    /// Inbound rate limiting settings.
    pub rate_limit: RateLimitConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before probing resumes.
    pub recovery_timeout_secs: u64,

    /// Maximum concurrent probe calls while Half-Open.
    pub half_open_max_calls: u32,

    /// Consecutive probe successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first try.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Per-retry growth factor.
    pub exponential_base: f64,

    /// Randomize delays to avoid synchronized retry storms.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Deadline enforcement configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Default timeout for wrapped calls in seconds.
    pub timeout_secs: u64,

    /// Completed calls slower than this are counted as slow.
    pub slow_threshold_secs: u64,

    /// Hard ceiling any requested timeout is clamped to, in seconds.
    pub max_timeout_secs: u64,

    /// Issue a best-effort remote cancellation when a call times out.
    pub cancel_on_timeout: bool,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            slow_threshold_secs: 5,
            max_timeout_secs: 120,
            cancel_on_timeout: true,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable inbound rate limiting.
    pub enabled: bool,

    /// Maximum requests per client within one window.
    pub max_requests_per_window: u32,

    /// Trailing window length in seconds.
    pub window_secs: u64,

    /// Request paths never subject to rate limiting.
    pub skip_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_window: 100,
            window_secs: 60,
            skip_paths: vec!["/health".to_string(), "/metrics".to_string()],
        }
    }
}
