//! Tracker metrics collection.
//!
//! Provides standardized metrics for monitoring job tracking:
//! - Status polls by kind and outcome
//! - Polling loops that gave up
//! - Events received over the snapshot feed
//! - Jobs reaching a terminal state

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Status polls by kind and outcome.
    pub const POLLS_TOTAL: &str = "adflow_tracker_polls_total";

    /// Polling loops stopped by the retry policy.
    pub const POLLING_EXHAUSTED_TOTAL: &str = "adflow_tracker_polling_exhausted_total";

    /// Snapshot feed events by kind and event type.
    pub const PUSH_EVENTS_TOTAL: &str = "adflow_tracker_push_events_total";

    /// Tracked jobs reaching a terminal status.
    pub const TERMINAL_TOTAL: &str = "adflow_tracker_terminal_total";
}

/// Poll outcome labels.
pub mod outcome {
    pub const OK: &str = "ok";
    pub const NOT_FOUND: &str = "not_found";
    pub const TRANSIENT: &str = "transient";
}

pub fn record_poll(kind: &str, outcome: &str) {
    counter!(
        names::POLLS_TOTAL,
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_polling_exhausted(kind: &str) {
    counter!(names::POLLING_EXHAUSTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_push_event(kind: &str, event: &str) {
    counter!(
        names::PUSH_EVENTS_TOTAL,
        "kind" => kind.to_string(),
        "event" => event.to_string()
    )
    .increment(1);
}

/// Record a terminal status; `status` is the final status, `reason` the failure class if any.
pub fn record_terminal(kind: &str, status: &str, reason: &str) {
    counter!(
        names::TERMINAL_TOTAL,
        "kind" => kind.to_string(),
        "status" => status.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}
