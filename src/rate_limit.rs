use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ApiError;
use crate::metrics::{RATE_LIMITED_TOTAL, TRACKED_CLIENTS};

pub const GLOBAL_MESSAGE: &str = "Too many requests from this IP, please try again later.";
pub const GENERATE_MESSAGE: &str = "Too many generation requests, please try again in an hour.";

// Rate limit entry - tracks requests per IP/key
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

/// Rejection handed back when a client has used up its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
    pub message: &'static str,
    pub retry_after: Duration,
}

/// Fixed-window counter keyed by client.
///
/// Each `admit` runs under the shard lock of its key, so the
/// check-and-increment is atomic per client.
pub struct RateLimiter {
    name: &'static str,
    entries: DashMap<String, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
    message: &'static str,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_requests: u32, window: Duration, message: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            max_requests,
            window,
            message,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn admit(&self, key: &str) -> Result<(), RateLimited> {
        self.admit_at(key, Instant::now())
    }

    pub(crate) fn admit_at(&self, key: &str, now: Instant) -> Result<(), RateLimited> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window expired? start a fresh one
        if now.saturating_duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            return Ok(());
        }

        let elapsed = now.saturating_duration_since(entry.window_start);
        Err(RateLimited {
            message: self.message,
            retry_after: self.window.saturating_sub(elapsed),
        })
    }

    /// Drops every entry whose window has elapsed. Returns how many went.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub(crate) fn evict_expired_at(&self, now: Instant) -> usize {
        // counted inside retain, admits may insert while the sweep runs
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.window_start) < self.window;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

/// Limiter plus the rule for turning a request into a client key.
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub trust_proxy: bool,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, trust_proxy: bool) -> Self {
        Self { limiter, trust_proxy }
    }
}

pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// Middleware: admit or answer 429 before the handler runs
pub async fn enforce(State(guard): State<RateLimitGuard>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, guard.trust_proxy);

    let outcome = guard.limiter.admit(&key);
    TRACKED_CLIENTS
        .with_label_values(&[guard.limiter.name()])
        .set(guard.limiter.tracked_clients() as f64);

    match outcome {
        Ok(()) => next.run(request).await,
        Err(limited) => {
            RATE_LIMITED_TOTAL
                .with_label_values(&[guard.limiter.name()])
                .inc();
            tracing::warn!(
                limiter = guard.limiter.name(),
                client = %key,
                retry_after_secs = limited.retry_after.as_secs(),
                "rate limit exceeded"
            );
            ApiError::from(limited).into_response()
        }
    }
}

/// Whole seconds, rounded up, for the `Retry-After` header.
pub fn retry_after_header(retry_after: Duration) -> (header::HeaderName, HeaderValue) {
    let mut secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs += 1;
    }
    (header::RETRY_AFTER, HeaderValue::from(secs))
}

// Periodic sweep so idle clients don't pile up
pub async fn sweeper(limiters: Vec<Arc<RateLimiter>>, every: Duration) {
    let mut interval = tokio::time::interval(every);

    tracing::debug!("Rate limit sweeper started (interval: {:?})", every);

    loop {
        interval.tick().await;

        for limiter in &limiters {
            let removed = limiter.evict_expired();
            TRACKED_CLIENTS
                .with_label_values(&[limiter.name()])
                .set(limiter.tracked_clients() as f64);
            if removed > 0 {
                tracing::debug!(limiter = limiter.name(), removed, "evicted expired windows");
            }
        }
    }
}
