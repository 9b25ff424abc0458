//! Sliding-window rate limiting, end to end: core window semantics and
//! the inbound middleware.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use tower::util::ServiceExt;

use upstream_guard::config::RateLimitConfig;
use upstream_guard::rate_limit::middleware::{rate_limit_middleware, RateLimitState};
use upstream_guard::SlidingWindowRateLimiter;

fn config(max: u32, window_secs: u64) -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        max_requests_per_window: max,
        window_secs,
        skip_paths: vec!["/health".to_string()],
    }
}

/// Client sends its full allowance at t=0; the next request at t=10s is
/// rejected with retry_after ≈ 50s; a request at t=61s is admitted.
#[tokio::test(start_paused = true)]
async fn window_scenario_for_single_client() {
    let limiter = SlidingWindowRateLimiter::new(&config(3, 60));

    for _ in 0..3 {
        limiter.allow("1.2.3.4").expect("allowance");
    }

    tokio::time::advance(Duration::from_secs(10)).await;
    let rejected = limiter.allow("1.2.3.4").unwrap_err();
    assert_eq!(rejected.retry_after, Duration::from_secs(50));

    tokio::time::advance(Duration::from_secs(51)).await;
    limiter.allow("1.2.3.4").expect("window fully rolled over");

    let stats = limiter.stats();
    assert_eq!(stats.total_admitted, 4);
    assert_eq!(stats.total_rejected, 1);
}

fn app(state: Arc<RateLimitState>) -> Router {
    Router::new()
        .route("/api/quote", get(|| async { "quote" }))
        .route("/health", get(|| async { "healthy" }))
        .layer(axum::middleware::from_fn_with_state(
            state,
            rate_limit_middleware,
        ))
}

fn request(path: &str, client: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{client}:9000").parse().expect("test address");
    let mut request = Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("test request");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn middleware_throttles_with_retry_after_header() {
    let state = Arc::new(RateLimitState::new(&config(2, 60)));
    let app = app(state);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request("/api/quote", "10.0.0.1"))
            .await
            .expect("routed");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(request("/api/quote", "10.0.0.1"))
        .await
        .expect("routed");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .expect("retry-after header present")
        .to_str()
        .expect("ascii")
        .parse()
        .expect("integer seconds");
    assert!(retry_after >= 1);
}

#[tokio::test]
async fn middleware_keys_clients_independently() {
    let state = Arc::new(RateLimitState::new(&config(1, 60)));
    let app = app(state);

    let first = app
        .clone()
        .oneshot(request("/api/quote", "10.0.0.1"))
        .await
        .expect("routed");
    assert_eq!(first.status(), StatusCode::OK);

    let other_client = app
        .clone()
        .oneshot(request("/api/quote", "10.0.0.2"))
        .await
        .expect("routed");
    assert_eq!(other_client.status(), StatusCode::OK);

    let throttled = app
        .clone()
        .oneshot(request("/api/quote", "10.0.0.1"))
        .await
        .expect("routed");
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn skip_paths_bypass_the_limiter() {
    let state = Arc::new(RateLimitState::new(&config(1, 60)));
    let app = app(state.clone());

    // Exhaust the client's allowance.
    let _ = app
        .clone()
        .oneshot(request("/api/quote", "10.0.0.1"))
        .await
        .expect("routed");

    // Health checks are never throttled, and never recorded.
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(request("/health", "10.0.0.1"))
            .await
            .expect("routed");
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(state.limiter().stats().total_admitted, 1);
}

#[tokio::test]
async fn disabled_limiter_passes_everything() {
    let mut config = config(1, 60);
    config.enabled = false;
    let state = Arc::new(RateLimitState::new(&config));
    let app = app(state);

    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(request("/api/quote", "10.0.0.1"))
            .await
            .expect("routed");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
