//! Metrics collection and export for chatter.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "chatter_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "chatter_connections_active";
    pub const TRANSPORTS_REGISTERED: &str = "chatter_transports_registered";
    pub const PRESENCE_BROADCASTS_TOTAL: &str = "chatter_presence_broadcasts_total";
    pub const AUTH_FAILURES_TOTAL: &str = "chatter_auth_failures_total";
    pub const MESSAGES_RELAYED_TOTAL: &str = "chatter_messages_relayed_total";
    pub const RELAY_FAILURES_TOTAL: &str = "chatter_relay_failures_total";
    pub const EVICTIONS_TOTAL: &str = "chatter_evictions_total";
    pub const FRAMES_TOTAL: &str = "chatter_frames_total";
    pub const FRAMES_BYTES: &str = "chatter_frames_bytes";
    pub const RELAY_LATENCY_SECONDS: &str = "chatter_relay_latency_seconds";
    pub const ERRORS_TOTAL: &str = "chatter_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open transports, authenticated or not"
    );
    metrics::describe_gauge!(
        names::TRANSPORTS_REGISTERED,
        "Current number of transports in the registry"
    );
    metrics::describe_counter!(
        names::PRESENCE_BROADCASTS_TOTAL,
        "Presence announcements triggered by registry changes"
    );
    metrics::describe_counter!(names::AUTH_FAILURES_TOTAL, "Rejected handshake credentials");
    metrics::describe_counter!(
        names::MESSAGES_RELAYED_TOTAL,
        "Messages persisted by the relay"
    );
    metrics::describe_counter!(
        names::RELAY_FAILURES_TOTAL,
        "Send events that were discarded, by reason"
    );
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Transports evicted because they could not keep up"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of frames processed");
    metrics::describe_histogram!(
        names::RELAY_LATENCY_SECONDS,
        "Time to persist and forward one message, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a registry change and the presence broadcast it triggered.
pub fn record_registry_change(registered: usize) {
    gauge!(names::TRANSPORTS_REGISTERED).set(registered as f64);
    counter!(names::PRESENCE_BROADCASTS_TOTAL).increment(1);
}

/// Record a rejected credential.
pub fn record_auth_failure() {
    counter!(names::AUTH_FAILURES_TOTAL).increment(1);
}

/// Record a relayed message and how long it took.
pub fn record_relayed(seconds: f64) {
    counter!(names::MESSAGES_RELAYED_TOTAL).increment(1);
    histogram!(names::RELAY_LATENCY_SECONDS).record(seconds);
}

/// Record a discarded send event.
pub fn record_relay_failure(kind: &str) {
    counter!(names::RELAY_FAILURES_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record an eviction.
pub fn record_eviction() {
    counter!(names::EVICTIONS_TOTAL).increment(1);
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::FRAMES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
