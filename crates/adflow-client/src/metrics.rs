//! Backend API metrics collection.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total backend requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "adflow_api_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "adflow_api_latency_seconds";

    /// Status reads answered from the response cache.
    pub const CACHE_HITS_TOTAL: &str = "adflow_api_cache_hits_total";
}

/// Record metrics for a completed backend request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a status read served from cache.
pub fn record_cache_hit(kind: &str) {
    counter!(names::CACHE_HITS_TOTAL, "kind" => kind.to_string()).increment(1);
}
