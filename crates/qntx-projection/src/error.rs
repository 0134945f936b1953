//! Error taxonomy for projection requests.
//!
//! Every failure a caller can observe carries a stable [`ErrorKind`] tag so that
//! calling code branches on kind, never on message text.

use thiserror::Error;

/// Stable, distinguishable error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Computation,
    Internal,
    Timeout,
    Overloaded,
}

impl ErrorKind {
    /// Wire tag for this kind. These strings are part of the public contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Computation => "computation_error",
            ErrorKind::Internal => "internal_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Overloaded => "overloaded_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed or out-of-contract input. Raised before any computation starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("empty dataset")]
    EmptyDataset,

    #[error("inconsistent dimensionality: row {row} has {found} values, expected {expected}")]
    InconsistentDimensionality {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid numeric value at row {row}, column {column}")]
    InvalidNumericValue { row: usize, column: usize },

    #[error("unknown algorithm '{name}', expected one of: {available}")]
    UnknownAlgorithm { name: String, available: String },

    #[error("invalid dimensionality: dim {dim} must be between 1 and the input dimension {input_dim}")]
    InvalidDimensionality { dim: i64, input_dim: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("dataset too large: {reason}")]
    TooLarge { reason: String },
}

/// Failure raised by a capability while computing a projection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("did not converge: {0}")]
    NonConvergence(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl CapabilityError {
    /// Whether retrying with identical inputs can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CapabilityError::ResourceExhausted(_))
    }
}

/// Error type returned by the projection pipeline.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{algorithm} projection failed: {source}")]
    Computation {
        algorithm: String,
        #[source]
        source: CapabilityError,
    },

    /// Contract violation by a capability. Always a bug signal.
    #[error("shape mismatch: {algorithm} returned {found_rows}x{found_cols}, expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        algorithm: String,
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("projection exceeded deadline of {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("projection capacity exhausted: {0}")]
    Overloaded(String),
}

impl ProjectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectionError::Validation(_) => ErrorKind::Validation,
            ProjectionError::Computation { .. } => ErrorKind::Computation,
            ProjectionError::ShapeMismatch { .. } | ProjectionError::Internal(_) => {
                ErrorKind::Internal
            }
            ProjectionError::Timeout { .. } => ErrorKind::Timeout,
            ProjectionError::Overloaded(_) => ErrorKind::Overloaded,
        }
    }
}

/// Result type alias using [`ProjectionError`].
pub type Result<T> = std::result::Result<T, ProjectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_tags_are_distinct() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::Computation,
            ErrorKind::Internal,
            ErrorKind::Timeout,
            ErrorKind::Overloaded,
        ];
        let mut tags: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(ValidationError::EmptyDataset.to_string(), "empty dataset");
        let err = ValidationError::InconsistentDimensionality {
            row: 1,
            expected: 3,
            found: 4,
        };
        assert!(err.to_string().starts_with("inconsistent dimensionality"));
        let err = ValidationError::InvalidNumericValue { row: 0, column: 2 };
        assert!(err.to_string().starts_with("invalid numeric value"));
        let err = ValidationError::UnknownAlgorithm {
            name: "nope".to_string(),
            available: "umap".to_string(),
        };
        assert!(err.to_string().starts_with("unknown algorithm"));
    }

    #[test]
    fn test_computation_keeps_cause() {
        let err = ProjectionError::Computation {
            algorithm: "umap".to_string(),
            source: CapabilityError::NonConvergence("sgd diverged".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Computation);
        let cause = err.source().map(|s| s.to_string());
        assert_eq!(cause.as_deref(), Some("did not converge: sgd diverged"));
    }

    #[test]
    fn test_shape_mismatch_is_internal() {
        let err = ProjectionError::ShapeMismatch {
            algorithm: "umap".to_string(),
            expected_rows: 10,
            expected_cols: 2,
            found_rows: 10,
            found_cols: 3,
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().starts_with("shape mismatch"));
    }

    #[test]
    fn test_only_resource_exhaustion_is_transient() {
        assert!(CapabilityError::ResourceExhausted("oom".into()).is_transient());
        assert!(!CapabilityError::Numerical("nan".into()).is_transient());
        assert!(!CapabilityError::Backend("boom".into()).is_transient());
    }
}
