//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - HTTP request counts and latency by method, path, and status
//! - Live gateway connections
//! - Realtime events pushed, by event type
//! - Rate-limit rejections, by bucket
//! - Refresh-token reuse detections

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request counter - tracks total requests by method, path, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace("messenger"),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

/// HTTP request latency histogram - tracks request duration in seconds
pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request latency in seconds")
            .namespace("messenger")
            .buckets(buckets),
        &["method", "path"],
    )
    .expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric")
});

/// Live gateway connections across all users
pub static GATEWAY_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("gateway_connections_active", "Number of live gateway connections").namespace("messenger"),
    )
    .expect("Failed to create GATEWAY_CONNECTIONS_ACTIVE metric")
});

/// Events pushed onto connection queues, by event type
pub static EVENTS_PUSHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_pushed_total", "Realtime events pushed to connections").namespace("messenger"),
        &["event"],
    )
    .expect("Failed to create EVENTS_PUSHED_TOTAL metric")
});

/// Requests rejected by the rate limiter, by bucket
pub static RATE_LIMIT_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("rate_limit_rejections_total", "Requests rejected by the rate limiter").namespace("messenger"),
        &["bucket"],
    )
    .expect("Failed to create RATE_LIMIT_REJECTIONS_TOTAL metric")
});

/// Rotated refresh tokens presented again
pub static REFRESH_REUSE_DETECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("refresh_reuse_detected_total", "Refresh token reuse detections").namespace("messenger"),
    )
    .expect("Failed to create REFRESH_REUSE_DETECTED_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
    registry
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");
    registry
        .register(Box::new(GATEWAY_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register GATEWAY_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(EVENTS_PUSHED_TOTAL.clone()))
        .expect("Failed to register EVENTS_PUSHED_TOTAL");
    registry
        .register(Box::new(RATE_LIMIT_REJECTIONS_TOTAL.clone()))
        .expect("Failed to register RATE_LIMIT_REJECTIONS_TOTAL");
    registry
        .register(Box::new(REFRESH_REUSE_DETECTED_TOTAL.clone()))
        .expect("Failed to register REFRESH_REUSE_DETECTED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn record_event_pushed(event: &str) {
    EVENTS_PUSHED_TOTAL.with_label_values(&[event]).inc();
}

pub fn record_rate_limited(bucket: &str) {
    RATE_LIMIT_REJECTIONS_TOTAL.with_label_values(&[bucket]).inc();
}

pub fn record_refresh_reuse() {
    REFRESH_REUSE_DETECTED_TOTAL.inc();
}

pub fn set_gateway_connections(count: usize) {
    GATEWAY_CONNECTIONS_ACTIVE.set(count as i64);
}
