//! Breaker registry.
//!
//! # Responsibilities
//! - Share breaker identity by dependency name across call sites
//! - Lazily create breakers on first use, race-free
//! - Enumerate all breakers for the health-reporting surface
//!
//! # Design Decisions
//! - Explicit registry object handed out at startup, not an implicit
//!   global: tests construct their own registry
//! - DashMap entry API gives double-checked creation, so two concurrent
//!   callers for the same name end up with one breaker
//! - Breakers live for the registry's lifetime; there is no eviction

use std::sync::Arc;

use dashmap::DashMap;

use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::config::CircuitBreakerConfig;

/// Process-wide map of dependency name to circuit breaker.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    /// Create a registry whose breakers default to `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: config,
        }
    }

    /// Return the breaker for `name`, creating it with the registry
    /// default config on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, &self.default_config)
    }

    /// Return the breaker for `name`, creating it with `config` on first
    /// use. An existing breaker keeps its original configuration.
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: &CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)));
        Arc::clone(entry.value())
    }

    /// Look up an existing breaker without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot stats for every registered breaker.
    pub fn all_stats(&self) -> Vec<BreakerStats> {
        self.breakers.iter().map(|entry| entry.stats()).collect()
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// True when no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
