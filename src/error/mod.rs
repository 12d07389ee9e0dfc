//! Error handling for the bronze-to-silver transform.

pub mod util;

use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Errors raised while transforming a batch of input units
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Missing input location or an invalid option combination. Aborts the run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Records lack the structure a stage needs. Fails the unit only.
    #[error("Schema error: {0}")]
    Schema(String),

    /// An enrichment or mapping dependency failed too many times in a row
    #[error("{service} unavailable after {failures} consecutive failures: {last_error}")]
    DependencyUnavailable {
        service: String,
        failures: usize,
        last_error: String,
    },

    /// The input unit is malformed or unreadable
    #[error("Failed to read {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    /// The output for a unit could not be persisted
    #[error("Failed to write {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Summary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Two or more input units resolve to the same silver output name
    #[error("Output name '{name}' is shared by {}", .units.join(", "))]
    OutputCollision { name: String, units: Vec<String> },

    /// A blocking worker panicked or was aborted
    #[error("Worker task failed: {0}")]
    Task(String),

    /// The run was cancelled before this unit started
    #[error("Run cancelled")]
    Cancelled,
}

impl TransformError {
    /// Create a read error for an input path
    pub fn read(path: &Path, message: impl Into<String>) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a write error for an output path
    pub fn write(path: &Path, message: impl Into<String>) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Only configuration errors abort the whole run
    #[must_use]
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Stable short label used in summaries
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Schema(_) => "schema",
            Self::DependencyUnavailable { .. } => "dependency_unavailable",
            Self::Read { .. } | Self::Parquet(_) => "read",
            Self::Write { .. } => "write",
            Self::OutputCollision { .. } => "output_collision",
            Self::Arrow(_) => "arrow",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Task(_) => "task",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<tokio::task::JoinError> for TransformError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Task(error.to_string())
    }
}

/// Result type for transform operations
pub type Result<T> = std::result::Result<T, TransformError>;

/// Outcome of a single external lookup that did not produce an answer
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// Transport failure, timeout, throttling or server error
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered but refused or garbled this request
    #[error("lookup rejected: {0}")]
    Rejected(String),
}

impl LookupError {
    /// Whether this failure counts towards the consecutive-failure threshold
    #[must_use]
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(error: reqwest::Error) -> Self {
        // The request URL carries the service credential in its query string
        let error = error.without_url();
        if error.is_decode() {
            return Self::Rejected(error.to_string());
        }
        match error.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                Self::Rejected(error.to_string())
            }
            _ => Self::Unavailable(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(TransformError::Configuration("x".into()).is_fatal_to_run());
        assert!(!TransformError::Schema("x".into()).is_fatal_to_run());
        assert!(!TransformError::write(Path::new("/tmp/out"), "disk full").is_fatal_to_run());
    }

    #[test]
    fn test_error_kinds() {
        let err = TransformError::DependencyUnavailable {
            service: "geocoder".into(),
            failures: 3,
            last_error: "timeout".into(),
        };
        assert_eq!(err.kind(), "dependency_unavailable");
        assert!(err.to_string().contains("3 consecutive failures"));
        assert_eq!(TransformError::read(Path::new("a.parquet"), "bad magic").kind(), "read");
    }

    #[test]
    fn test_lookup_error_classification() {
        assert!(LookupError::Unavailable("timeout".into()).is_dependency_failure());
        assert!(!LookupError::Rejected("bad query".into()).is_dependency_failure());
    }

    #[test]
    fn test_output_collision_names_every_unit() {
        let err = TransformError::OutputCollision {
            name: "silver_a__b".into(),
            units: vec!["a/b.parquet".into(), "a__b.parquet".into()],
        };
        assert_eq!(err.kind(), "output_collision");
        assert!(!err.is_fatal_to_run());
        assert!(err.to_string().contains("a/b.parquet, a__b.parquet"));
    }

    #[tokio::test]
    async fn test_transport_errors_drop_the_request_url() {
        let error = reqwest::Client::new()
            .get("http://127.0.0.1:1/search?key=SECRET-IN-QUERY")
            .send()
            .await
            .unwrap_err();

        let lookup = LookupError::from(error);
        assert!(lookup.is_dependency_failure());
        assert!(!lookup.to_string().contains("SECRET-IN-QUERY"));
    }
}
