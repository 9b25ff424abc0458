//! Graceful degradation: fallback substitution for failing dependencies.
//!
//! # Responsibilities
//! - Hold fallback producers registered per dependency name at startup
//! - Substitute the fallback's result when the primary call fails
//! - Track which dependencies are currently degraded, and clear the
//!   marking when the primary recovers
//!
//! # Design Decisions
//! - This is the only component allowed to replace a failure with a
//!   different result, and only when a fallback was registered
//! - If the fallback itself fails, the primary's original error
//!   propagates so the root cause is never masked
//! - Generic over one opaque payload type per manager; a process
//!   standardizes on its response envelope (tests use plain values)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::BoxError;
use crate::observability::metrics;

type FallbackProducer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

struct FallbackEntry<T> {
    producer: FallbackProducer<T>,
    description: String,
}

struct DegradedEntry {
    since: Instant,
    last_error: String,
    invocation_count: u64,
}

/// Snapshot of one degraded dependency for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DegradedService {
    pub name: String,
    pub description: String,
    pub degraded_for_secs: f64,
    pub last_error: String,
    pub invocation_count: u64,
}

/// Maps failing dependency names to registered fallback producers.
///
/// Registration happens once per name during startup (last write wins);
/// the degraded map mutates under concurrent load and is lock-guarded.
pub struct DegradationManager<T> {
    fallbacks: Mutex<HashMap<String, FallbackEntry<T>>>,
    degraded: Mutex<HashMap<String, DegradedEntry>>,
}

impl<T: Send + 'static> DegradationManager<T> {
    pub fn new() -> Self {
        Self {
            fallbacks: Mutex::new(HashMap::new()),
            degraded: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the fallback producer for `name`.
    pub fn register_fallback<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        fallback: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let entry = FallbackEntry {
            producer: Arc::new(move || Box::pin(fallback())),
            description: description.into(),
        };
        self.fallbacks
            .lock()
            .expect("fallback mutex poisoned")
            .insert(name.into(), entry);
    }

    /// Invoke `operation`; on failure, substitute the registered
    /// fallback's result.
    ///
    /// A primary success clears any degraded marking for `name`. A
    /// primary failure with no registered fallback propagates unchanged.
    /// A fallback failure also propagates the primary's error.
    pub async fn execute_with_fallback<E, F, Fut>(&self, name: &str, operation: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        match operation().await {
            Ok(value) => {
                self.clear_degraded(name);
                Ok(value)
            }
            Err(primary_err) => {
                let producer = {
                    let fallbacks = self.fallbacks.lock().expect("fallback mutex poisoned");
                    fallbacks.get(name).map(|entry| entry.producer.clone())
                };
                let Some(producer) = producer else {
                    return Err(primary_err);
                };

                self.mark_degraded(name, &primary_err);
                metrics::record_fallback(name);

                match producer().await {
                    Ok(value) => Ok(value),
                    Err(fallback_err) => {
                        tracing::error!(
                            service = name,
                            error = %fallback_err,
                            "fallback failed, propagating primary error"
                        );
                        Err(primary_err)
                    }
                }
            }
        }
    }

    /// Snapshot of currently degraded dependencies.
    pub fn degraded_services(&self) -> Vec<DegradedService> {
        let now = Instant::now();
        let fallbacks = self.fallbacks.lock().expect("fallback mutex poisoned");
        let degraded = self.degraded.lock().expect("degraded mutex poisoned");
        degraded
            .iter()
            .map(|(name, entry)| DegradedService {
                name: name.clone(),
                description: fallbacks
                    .get(name)
                    .map(|f| f.description.clone())
                    .unwrap_or_default(),
                degraded_for_secs: (now - entry.since).as_secs_f64(),
                last_error: entry.last_error.clone(),
                invocation_count: entry.invocation_count,
            })
            .collect()
    }

    /// True when `name` is currently serving from its fallback.
    pub fn is_degraded(&self, name: &str) -> bool {
        self.degraded
            .lock()
            .expect("degraded mutex poisoned")
            .contains_key(name)
    }

    fn mark_degraded<E: std::fmt::Display>(&self, name: &str, err: &E) {
        let mut degraded = self.degraded.lock().expect("degraded mutex poisoned");
        match degraded.get_mut(name) {
            Some(entry) => {
                entry.invocation_count += 1;
                entry.last_error = err.to_string();
            }
            None => {
                tracing::warn!(service = name, error = %err, "service degraded, serving fallback");
                degraded.insert(
                    name.to_string(),
                    DegradedEntry {
                        since: Instant::now(),
                        last_error: err.to_string(),
                        invocation_count: 1,
                    },
                );
            }
        }
    }

    fn clear_degraded(&self, name: &str) {
        let mut degraded = self.degraded.lock().expect("degraded mutex poisoned");
        if degraded.remove(name).is_some() {
            tracing::info!(service = name, "service recovered, fallback cleared");
        }
    }
}

impl<T: Send + 'static> Default for DegradationManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
