//! Error types for the claw-metrics crate.

use thiserror::Error;

/// Errors that can occur while setting up the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric with the same name was already registered.
    ///
    /// This is a build or configuration defect; callers treat it as fatal
    /// during process startup.
    #[error("metric already registered: {name}")]
    DuplicateMetric {
        /// The conflicting metric name.
        name: String,
    },

    /// The metric name is invalid (empty or contains invalid characters).
    #[error("invalid metric name: {reason}")]
    InvalidMetricName {
        /// The reason the name is invalid.
        reason: String,
    },
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
