//! Metrics emitted by the hub.
//!
//! Recorded through the `metrics` facade; installing an exporter is up to
//! the binary.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const MESSAGES_PUBLISHED: &str = "switchboard_messages_published_total";
    pub const MESSAGES_DELIVERED: &str = "switchboard_messages_delivered_total";
    pub const MESSAGES_DROPPED: &str = "switchboard_messages_dropped_total";
    pub const RESUBSCRIPTIONS: &str = "switchboard_resubscriptions_total";
    pub const BACKPLANE_ERRORS: &str = "switchboard_backplane_errors_total";
    pub const CONNECTIONS_ACTIVE: &str = "switchboard_connections_active";
    pub const GROUPS_ACTIVE: &str = "switchboard_groups_active";
}

/// Record a message published to the backplane.
pub fn record_published() {
    counter!(names::MESSAGES_PUBLISHED).increment(1);
}

/// Record frames queued for local connections.
pub fn record_delivered(count: usize) {
    counter!(names::MESSAGES_DELIVERED).increment(count as u64);
}

/// Record a dropped message.
pub fn record_dropped(reason: &'static str) {
    counter!(names::MESSAGES_DROPPED, "reason" => reason).increment(1);
}

/// Record a bridge swapping its subscription.
pub fn record_resubscription(bridge: &'static str) {
    counter!(names::RESUBSCRIPTIONS, "bridge" => bridge).increment(1);
}

/// Record a failed backplane operation.
pub fn record_backplane_error(op: &'static str) {
    counter!(names::BACKPLANE_ERRORS, "op" => op).increment(1);
}

/// Update the registered connection count.
pub fn set_active_connections(count: usize) {
    gauge!(names::CONNECTIONS_ACTIVE).set(count as f64);
}

/// Update the group count.
pub fn set_active_groups(count: usize) {
    gauge!(names::GROUPS_ACTIVE).set(count as f64);
}
