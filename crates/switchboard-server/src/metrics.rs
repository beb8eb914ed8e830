//! Metrics export.
//!
//! The hub records through the `metrics` facade; this module describes
//! those metrics, adds the server's own, and serves them to Prometheus.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use switchboard_core::metrics::names as hub;
use tracing::info;

/// Server metric names.
pub mod names {
    pub const UPGRADES_TOTAL: &str = "switchboard_upgrades_total";
    pub const SOCKETS_OPEN: &str = "switchboard_sockets_open";
    pub const AUTH_FAILURES: &str = "switchboard_auth_failures_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        hub::MESSAGES_PUBLISHED,
        "Client messages published to the backplane"
    );
    metrics::describe_counter!(
        hub::MESSAGES_DELIVERED,
        "Frames queued for local connections"
    );
    metrics::describe_counter!(hub::MESSAGES_DROPPED, "Messages dropped, by reason");
    metrics::describe_counter!(
        hub::RESUBSCRIPTIONS,
        "Backplane subscription swaps, by bridge"
    );
    metrics::describe_counter!(
        hub::BACKPLANE_ERRORS,
        "Failed backplane operations, by operation"
    );
    metrics::describe_gauge!(hub::CONNECTIONS_ACTIVE, "Registered connections");
    metrics::describe_gauge!(hub::GROUPS_ACTIVE, "Groups with at least one local member");

    metrics::describe_counter!(names::UPGRADES_TOTAL, "WebSocket upgrades accepted");
    metrics::describe_gauge!(names::SOCKETS_OPEN, "WebSocket connections currently open");
    metrics::describe_counter!(names::AUTH_FAILURES, "Upgrade requests rejected as unauthenticated");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a rejected upgrade.
pub fn record_auth_failure() {
    counter!(names::AUTH_FAILURES).increment(1);
}

/// Tracks an open WebSocket; records the close on drop.
pub struct SocketMetricsGuard;

impl SocketMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        counter!(names::UPGRADES_TOTAL).increment(1);
        gauge!(names::SOCKETS_OPEN).increment(1.0);
        Self
    }
}

impl Default for SocketMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SocketMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SOCKETS_OPEN).decrement(1.0);
    }
}
