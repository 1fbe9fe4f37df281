//! Error types for the fairframe engine.
//!
//! Uses `thiserror` for a top-level error with one structured enum per
//! failure category: bad construction arguments, length mismatches between
//! co-indexed inputs, misuse of the frame's state machine, and aggregation
//! over values that cannot be compared.

/// Top-level error type for the fairframe engine.
#[derive(Debug, thiserror::Error)]
pub enum MetricFrameError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("No data to process, please add batches with `add_batch`")]
    EmptyData,

    #[error("Metric '{name}' failed: {source}")]
    Metric {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

/// Errors from invalid constructor or batch arguments.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Non streaming metrics require data to process. Set streaming=true for streaming metrics")]
    EmptyData,

    #[error("Streaming metrics must be initialized with empty inputs")]
    NonEmptyStreamingInit,

    #[error("Detected duplicate feature name: '{name}'")]
    DuplicateFeatureName { name: String },

    #[error("Column names must be strings. Name '{name}' is of type {kind}")]
    InvalidColumnName { name: String, kind: String },

    #[error("Feature lists must be of scalar types")]
    NonScalarFeatureList,

    #[error("Feature array has too many dimensions ({dims})")]
    TooManyDimensions { dims: usize },

    #[error("Sample params must be {expected}")]
    InvalidSampleParams { expected: &'static str },

    #[error("Keys in sample params do not match those in the metric collection: {keys:?}")]
    SampleParamKeysMismatch { keys: Vec<String> },

    #[error("Detected duplicate metric name: '{name}'")]
    DuplicateMetricName { name: String },

    #[error("A metric collection must contain at least one function")]
    NoMetrics,

    #[error("At least one sensitive feature must be supplied")]
    NoFeatures,
}

/// Errors from co-indexed inputs whose lengths disagree.
#[derive(Debug, thiserror::Error)]
pub enum ConsistencyError {
    #[error("Received '{name}' of length {actual} when length {expected} was expected")]
    InconsistentLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column '{name}' has rows of differing widths ({first} and {other})")]
    RaggedColumn {
        name: String,
        first: usize,
        other: usize,
    },
}

/// Errors from calls that are invalid for the frame's current state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("This MetricFrame does not support adding data")]
    NotStreaming,

    #[error("{message}")]
    InconsistentControlFeatureUsage { message: &'static str },

    #[error("{message}")]
    InconsistentSampleParams { message: String },

    #[error("Can't concatenate batches of {what}: {first} vs {other}")]
    IncompatibleBatchTypes {
        what: &'static str,
        first: String,
        other: String,
    },

    #[error("Unrecognised aggregation method '{method}'")]
    InvalidAggregationMethod { method: String },
}

/// Errors from aggregating over group-level metric values.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Metric '{metric}' returned a non-scalar value, which cannot be aggregated")]
    NonScalarValue { metric: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = MetricFrameError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MetricFrameError::from(ConfigurationError::DuplicateFeatureName {
            name: "sex".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Detected duplicate feature name: 'sex'"
        );
    }

    #[test]
    fn test_consistency_error_display() {
        let err = ConsistencyError::InconsistentLength {
            name: "y_pred".into(),
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Received 'y_pred' of length 3 when length 4 was expected"
        );
    }

    #[test]
    fn test_metric_error_keeps_source() {
        let err = MetricFrameError::Metric {
            name: "acc".into(),
            source: anyhow::anyhow!("division by zero"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("division by zero"));
    }
}
