//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, delays ordered, timeouts
//!   within the hard ceiling)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ResilienceConfig;

/// One semantic problem found in a config.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Check all semantic constraints, collecting every violation.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.breaker.failure_threshold == 0 {
        errors.push(err("breaker.failure_threshold", "must be at least 1"));
    }
    if config.breaker.half_open_max_calls == 0 {
        errors.push(err("breaker.half_open_max_calls", "must be at least 1"));
    }
    if config.breaker.success_threshold == 0 {
        errors.push(err("breaker.success_threshold", "must be at least 1"));
    }
    if config.breaker.recovery_timeout_secs == 0 {
        errors.push(err("breaker.recovery_timeout_secs", "must be at least 1"));
    }

    if config.retry.max_attempts == 0 {
        errors.push(err("retry.max_attempts", "must be at least 1"));
    }
    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        errors.push(err(
            "retry.max_delay_ms",
            "must be greater than or equal to base_delay_ms",
        ));
    }
    if config.retry.exponential_base < 1.0 {
        errors.push(err("retry.exponential_base", "must be at least 1.0"));
    }

    if config.deadline.timeout_secs == 0 {
        errors.push(err("deadline.timeout_secs", "must be at least 1"));
    }
    if config.deadline.max_timeout_secs < config.deadline.timeout_secs {
        errors.push(err(
            "deadline.max_timeout_secs",
            "must be greater than or equal to timeout_secs",
        ));
    }

    if config.rate_limit.max_requests_per_window == 0 {
        errors.push(err("rate_limit.max_requests_per_window", "must be at least 1"));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(err("rate_limit.window_secs", "must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
