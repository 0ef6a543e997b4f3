//! Error types for the correlation engine.

use thiserror::Error;

/// Failures raised while coercing or transforming a single series.
///
/// Insufficient data is never reported here: short or empty inputs resolve to
/// an empty series (or `None` from the correlation and index stages).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// A raw date or value could not be parsed.
    #[error("malformed input{}: {reason}", row_suffix(.row))]
    MalformedInput {
        /// Zero-based row index of the offending point, when known.
        row: Option<usize>,
        reason: String,
    },

    /// A required parameter was not supplied, e.g. the fiscal year end for quarterly buckets.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid aggregation period: {0}")]
    InvalidAggregationPeriod(String),

    #[error("invalid correlation metric: {0}")]
    InvalidCorrelationMetric(String),

    #[error("invalid month: {0}")]
    InvalidMonth(String),
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at row {row}"),
        None => String::new(),
    }
}

impl TransformError {
    pub(crate) fn malformed(row: Option<usize>, reason: impl Into<String>) -> Self {
        TransformError::MalformedInput {
            row,
            reason: reason.into(),
        }
    }
}

/// Failures loading series and metadata from the CSV directory store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Failures reading service configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Result type for series transforms.
pub type Result<T> = std::result::Result<T, TransformError>;
