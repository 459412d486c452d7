//! Per-client rate limiting.
//!
//! The limiter is an injected capability behind the [`RateLimiter`] trait
//! so deployments can swap the in-process token bucket for a distributed
//! counter, and tests can swap in doubles.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Yes/no admission gate consumed by the policy pipeline's first stage.
pub trait RateLimiter: Send + Sync {
    fn try_acquire(&self, key: &str) -> bool;
}

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self { tokens: capacity, last_update: Instant::now() }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// In-process token-bucket limiter keyed by client IP.
pub struct TokenBucketLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucketLimiter {
    /// `requests` per `window_secs`, with burst capacity equal to the
    /// full window budget.
    pub fn new(requests: u32, window_secs: u64) -> Self {
        let capacity = f64::from(requests.max(1));
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            refill_rate: capacity / window_secs.max(1) as f64,
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn try_acquire(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_acquire(self.capacity, self.refill_rate)
    }
}

/// First gate of the policy pipeline. Runs before any request parsing.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let key = client_ip(request.headers(), Some(addr));
    if state.limiter.try_acquire(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client_ip = %key, path = %request.uri().path(), "rate limit exceeded");
        ApiError::RateLimited(
            "Limite di richieste superato, riprova tra qualche secondo".to_string(),
        )
        .into_response()
    }
}

/// Client identity for rate limiting and audit logs. Behind the platform
/// edge the socket peer is the edge itself, so `x-forwarded-for` wins.
pub fn client_ip(headers: &axum::http::HeaderMap, addr: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| addr.map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
