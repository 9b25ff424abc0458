//! End-to-end breaker behavior and composition with retry, deadline
//! enforcement, and fallback substitution.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use upstream_guard::config::{CircuitBreakerConfig, DeadlineConfig};
use upstream_guard::{
    with_retry, BreakerError, BreakerRegistry, CircuitBreaker, CircuitState, DeadlineEnforcer,
    DegradationManager, RetryPolicy,
};

fn breaker_config(failure_threshold: u32, recovery_timeout_secs: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        recovery_timeout_secs,
        half_open_max_calls: 1,
        success_threshold: 1,
    }
}

/// Failures at t=0, 0.1s, 0.2s open the breaker; a call at t=0.5s is
/// rejected with retry_after ≈ 0.7s; a probe after the recovery timeout
/// succeeds and closes the breaker.
#[tokio::test(start_paused = true)]
async fn breaker_opens_rejects_then_recovers() {
    let breaker = CircuitBreaker::new("market-data", &breaker_config(3, 1));

    for _ in 0..3 {
        let _ = breaker.call(|| async { Err::<(), &str>("503") }).await;
        tokio::time::advance(Duration::from_millis(100)).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // Now at t=0.3s; move to t=0.5s and expect a rejection.
    tokio::time::advance(Duration::from_millis(200)).await;
    match breaker.call(|| async { Ok::<_, &str>(()) }).await {
        Err(BreakerError::Open(e)) => {
            assert_eq!(e.name, "market-data");
            assert_eq!(e.retry_after, Duration::from_millis(700));
        }
        other => panic!("expected rejection, got ok={}", other.is_ok()),
    }

    // Past the recovery timeout the next call is admitted as a probe.
    tokio::time::advance(Duration::from_millis(700)).await;
    breaker
        .call(|| async { Ok::<_, &str>(()) })
        .await
        .expect("probe admitted and succeeded");
    assert_eq!(breaker.state(), CircuitState::Closed);

    let stats = breaker.stats();
    assert_eq!(stats.total_failures, 3);
    assert_eq!(stats.total_successes, 1);
    assert_eq!(stats.total_rejected, 1);
}

/// Retries happen inside a single breaker admission: a transiently
/// failing upstream recovers without ever tripping the breaker.
#[tokio::test(start_paused = true)]
async fn retry_inside_breaker_masks_transient_failures() {
    let registry = BreakerRegistry::new(breaker_config(3, 30));
    let breaker = registry.get_or_create("llm");

    let attempts = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(500),
        exponential_base: 2.0,
        jitter: false,
    };

    let seen = attempts.clone();
    let result = breaker
        .call(|| async {
            with_retry(&policy, || {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("connection reset")
                    } else {
                        Ok("completion")
                    }
                }
            })
            .await
        })
        .await;

    assert_eq!(result.unwrap(), "completion");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let stats = breaker.stats();
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.total_successes, 1);
}

/// Breaker + deadline + fallback composed the way a request handler
/// uses them: the primary times out repeatedly, the breaker opens, and
/// the degradation manager keeps serving the registered fallback.
#[tokio::test(start_paused = true)]
async fn full_stack_degrades_to_fallback() {
    let registry = BreakerRegistry::new(breaker_config(2, 30));
    let breaker = registry.get_or_create("quotes");
    let enforcer = DeadlineEnforcer::new(&DeadlineConfig {
        timeout_secs: 1,
        slow_threshold_secs: 1,
        max_timeout_secs: 10,
        cancel_on_timeout: false,
    });
    let manager: DegradationManager<String> = DegradationManager::new();
    manager.register_fallback("quotes", "last cached quote", || async {
        Ok("cached:AAPL=190.12".to_string())
    });

    let mut responses = Vec::new();
    for _ in 0..3 {
        let response = manager
            .execute_with_fallback("quotes", || async {
                breaker
                    .call(|| {
                        enforcer.execute(
                            || async {
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                Ok::<String, &str>("live quote".into())
                            },
                            "quotes",
                            None,
                        )
                    })
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;
        responses.push(response.expect("fallback served"));
    }

    assert!(responses.iter().all(|r| r == "cached:AAPL=190.12"));
    assert!(manager.is_degraded("quotes"));
    // Two timeouts tripped the breaker; the third call never reached
    // the upstream.
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.stats().total_rejected, 1);
    assert_eq!(enforcer.stats().timed_out_calls, 2);

    // Upstream recovery: breaker probe succeeds, degraded mark clears.
    tokio::time::advance(Duration::from_secs(30)).await;
    let recovered = manager
        .execute_with_fallback("quotes", || async {
            breaker
                .call(|| enforcer.execute(|| async { Ok::<String, &str>("live".into()) }, "quotes", None))
                .await
                .map_err(|e| e.to_string())
        })
        .await;
    assert_eq!(recovered.unwrap(), "live");
    assert!(!manager.is_degraded("quotes"));
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Registry stats surface every breaker for health reporting.
#[tokio::test]
async fn registry_reports_all_breakers() {
    let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
    registry.get_or_create("market-data");
    let llm = registry.get_or_create("llm");
    let _ = llm.call(|| async { Err::<(), &str>("502") }).await;

    let stats = registry.all_stats();
    assert_eq!(stats.len(), 2);
    let llm_stats = stats.iter().find(|s| s.name == "llm").expect("llm breaker");
    assert_eq!(llm_stats.total_failures, 1);
    assert!(serde_json::to_string(&stats).expect("stats serialize").contains("\"llm\""));
}
