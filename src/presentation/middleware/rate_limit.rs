//! Rate Limiting Middleware
//!
//! In-process sliding-window rate limiting. Each bucket key keeps the
//! timestamps of its accepted requests inside the window; a request is
//! rejected once the bucket holds `limit` of them.
//!
//! Buckets:
//! - `auth:<client-ip>` for register, login and refresh
//! - `send:<username>` for message sends and uploads

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitSettings;
use crate::infrastructure::metrics;
use crate::presentation::middleware::auth::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Outcome of an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: usize,
    pub remaining: usize,
}

/// Rejection: the caller may retry after this long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 || secs == 0 {
            secs + 1
        } else {
            secs
        }
    }
}

impl From<RateLimited> for AppError {
    fn from(limited: RateLimited) -> Self {
        AppError::RateLimited {
            retry_after_secs: limited.retry_after_secs(),
        }
    }
}

/// Sliding-window limiter shared by all requests of the process.
pub struct RateLimiter {
    window: Duration,
    buckets: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.window())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &str, limit: usize) -> Result<RateLimitInfo, RateLimited> {
        self.check_at(key, limit, Instant::now())
    }

    /// Check and record one request for `key` at `now`.
    pub fn check_at(&self, key: &str, limit: usize, now: Instant) -> Result<RateLimitInfo, RateLimited> {
        let mut bucket = self.buckets.entry(key.to_string()).or_default();
        self.evict(&mut bucket, now);

        if bucket.len() >= limit {
            let retry_after = match bucket.front() {
                Some(oldest) => self.window.saturating_sub(now.saturating_duration_since(*oldest)),
                None => self.window,
            };
            return Err(RateLimited { retry_after });
        }

        bucket.push_back(now);
        Ok(RateLimitInfo {
            limit,
            remaining: limit - bucket.len(),
        })
    }

    /// Drop buckets with no request left inside the window.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            self.evict(bucket, now);
            !bucket.is_empty()
        });
        before.saturating_sub(self.buckets.len())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn evict(&self, bucket: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = bucket.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                bucket.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Client address for per-IP buckets.
///
/// Priority: first X-Forwarded-For entry, X-Real-IP, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| ip.parse::<IpAddr>().is_ok());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| ip.parse::<IpAddr>().is_ok())
    };

    match forwarded.or_else(real_ip) {
        Some(ip) => ip.to_string(),
        None => match peer {
            Some(addr) => addr.ip().to_string(),
            None => {
                tracing::warn!("Could not determine client address for rate limiting");
                "unknown".to_string()
            }
        },
    }
}

fn enforce(limiter: &RateLimiter, bucket: &'static str, key: &str, limit: usize) -> Result<RateLimitInfo, AppError> {
    limiter.check(key, limit).map_err(|limited| {
        metrics::record_rate_limited(bucket);
        tracing::warn!(key = %key, retry_after_secs = limited.retry_after_secs(), "Rate limit exceeded");
        AppError::from(limited)
    })
}

fn add_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    if let Ok(v) = header::HeaderValue::from_str(&info.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = header::HeaderValue::from_str(&info.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
}

/// `auth:<client-ip>` bucket for credential endpoints.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    let ip = client_ip(request.headers(), peer);
    let key = format!("auth:{}", ip);
    let info = enforce(&state.rate_limiter, "auth", &key, state.settings.rate_limit.max_auth)?;

    let mut response = next.run(request).await;
    add_rate_limit_headers(response.headers_mut(), &info);
    Ok(response)
}

/// `send:<username>` bucket. Runs after the auth middleware.
pub async fn rate_limit_send(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let username = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.username.clone())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;
    let key = format!("send:{}", username);
    let info = enforce(&state.rate_limiter, "send", &key, state.settings.rate_limit.max_send)?;

    let mut response = next.run(request).await;
    add_rate_limit_headers(response.headers_mut(), &info);
    Ok(response)
}
