//! Inbound rate-limit middleware.
//!
//! # Responsibilities
//! - Key inbound requests by client IP
//! - Skip designated paths (health checks, metrics scrapes) before any
//!   limiter state is touched
//! - Turn limiter rejections into 429 responses with a `Retry-After` hint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::RateLimitConfig;
use crate::rate_limit::SlidingWindowRateLimiter;

/// Shared state for the rate-limit middleware.
pub struct RateLimitState {
    limiter: SlidingWindowRateLimiter,
    enabled: bool,
    skip_paths: Vec<String>,
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: SlidingWindowRateLimiter::new(config),
            enabled: config.enabled,
            skip_paths: config.skip_paths.clone(),
        }
    }

    /// The underlying limiter, for stats reporting.
    pub fn limiter(&self) -> &SlidingWindowRateLimiter {
        &self.limiter
    }

    fn skips(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| p == path)
    }
}

/// Middleware function for per-client request throttling.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled || state.skips(request.uri().path()) {
        return next.run(request).await;
    }

    let client_key = addr.ip().to_string();
    match state.limiter.allow(&client_key) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            tracing::warn!(
                client = %client_key,
                retry_after_secs = rejection.retry_after.as_secs(),
                "rate limit exceeded"
            );
            let mut response = Response::new(Body::from("Rate limit exceeded"));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(rejection.retry_after.as_secs()),
            );
            response
        }
    }
}
