//! Store metrics collection.
//!
//! Provides standardized metrics for monitoring store operations:
//! - Operation counters by operation and outcome
//! - Operation latency histograms
//! - Documents-touched counters per operation

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "store_operations_total";

    /// Documents read or written by operation.
    pub const DOCUMENTS_TOTAL: &str = "store_documents_total";

    /// Operation latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "store_latency_seconds";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed store operation.
pub fn record_operation(operation: &str, ok: bool, latency_ms: f64) {
    let outcome = if ok { "ok" } else { "error" };

    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record the number of documents an operation touched.
pub fn record_documents(operation: &str, count: u64) {
    counter!(
        names::DOCUMENTS_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(count);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::OPERATIONS_TOTAL.contains("operations"));
        assert!(names::DOCUMENTS_TOTAL.contains("documents"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
    }
}
