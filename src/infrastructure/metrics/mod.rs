//! Prometheus Metrics Module
//!
//! # Metrics Collected
//! - HTTP request counts and latency by method, route and status
//! - Live gateway connections
//! - Messages accepted by destination kind
//! - Friend request transitions by resulting status
//! - Private chats created

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "social_chat";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
    HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["method", "path"],
    )
    .expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric")
});

/// Connections currently in the `Bound` state
pub static GATEWAY_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("gateway_connections", "Bound real-time connections").namespace(NAMESPACE),
    )
    .expect("Failed to create GATEWAY_CONNECTIONS metric")
});

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("messages_sent_total", "Messages accepted by the pipeline").namespace(NAMESPACE),
        &["destination"], // "room", "private_chat"
    )
    .expect("Failed to create MESSAGES_SENT_TOTAL metric")
});

pub static FRIEND_REQUEST_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "friend_request_transitions_total",
            "Friend requests created or moved to a terminal status",
        )
        .namespace(NAMESPACE),
        &["status"],
    )
    .expect("Failed to create FRIEND_REQUEST_TRANSITIONS_TOTAL metric")
});

pub static PRIVATE_CHATS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("private_chats_created_total", "Private chats created").namespace(NAMESPACE),
    )
    .expect("Failed to create PRIVATE_CHATS_CREATED_TOTAL metric")
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
    registry
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");
    registry
        .register(Box::new(GATEWAY_CONNECTIONS.clone()))
        .expect("Failed to register GATEWAY_CONNECTIONS");
    registry
        .register(Box::new(MESSAGES_SENT_TOTAL.clone()))
        .expect("Failed to register MESSAGES_SENT_TOTAL");
    registry
        .register(Box::new(FRIEND_REQUEST_TRANSITIONS_TOTAL.clone()))
        .expect("Failed to register FRIEND_REQUEST_TRANSITIONS_TOTAL");
    registry
        .register(Box::new(PRIVATE_CHATS_CREATED_TOTAL.clone()))
        .expect("Failed to register PRIVATE_CHATS_CREATED_TOTAL");
}

/// Encode all metrics in the Prometheus text format.
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

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn record_message_sent(destination: &str) {
    MESSAGES_SENT_TOTAL.with_label_values(&[destination]).inc();
}

pub fn record_friend_request(status: &str) {
    FRIEND_REQUEST_TRANSITIONS_TOTAL
        .with_label_values(&[status])
        .inc();
}

pub fn record_private_chat_created() {
    PRIVATE_CHATS_CREATED_TOTAL.inc();
}

pub fn set_gateway_connections(count: usize) {
    GATEWAY_CONNECTIONS.set(count as i64);
}
