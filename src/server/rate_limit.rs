use crate::server::error::ApiError;
use crate::server::ip;
use crate::server::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Entries kept before expired windows are swept.
const SWEEP_THRESHOLD: usize = 10_000;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per client IP.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    hits: Mutex<HashMap<String, Window>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self { window, max_requests, hits: Mutex::new(HashMap::new()) }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Counts one request. `Err` carries the seconds until the window resets.
    pub fn check(&self, key: &str) -> Result<u32, u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<u32, u64> {
        let mut hits = lock(&self.hits);
        if hits.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = hits.entry(key.to_string()).or_insert(Window { started: now, count: 0 });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;

        if entry.count > self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return Err(self.window.saturating_sub(elapsed).as_secs().max(1));
        }
        Ok(self.max_requests - entry.count)
    }
}

fn limited(retry_after: u64, message: &str) -> Response {
    let mut response = ApiError::too_many_requests(message).into_response();
    if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, v);
    }
    response
}

async fn apply(
    state: &AppState,
    limiter: &RateLimiter,
    connect_info: &ConnectInfo<SocketAddr>,
    headers: &HeaderMap,
    message: &str,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let ip = ip::extract_real_ip(headers, connect_info, state.config.server.trust_proxy_headers);
    match limiter.check(&ip) {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("ratelimit-limit", HeaderValue::from(limiter.max_requests()));
            headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Err(retry_after) => {
            tracing::warn!(ip = %ip, "Rate limit exceeded");
            limited(retry_after, message)
        }
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let limiter = state.limiter.clone();
    apply(&state, &limiter, &connect_info, &headers, "Too many requests, please try again later", request, next).await
}

/// Stricter limit for long-lived SSE connections.
pub async fn stream_rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let limiter = state.stream_limiter.clone();
    apply(&state, &limiter, &connect_info, &headers, "Too many stream connections", request, next).await
}
