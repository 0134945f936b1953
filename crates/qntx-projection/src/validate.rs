//! Request validation: check-and-convert before any computation.

use crate::config::{HyperparameterOverrides, Limits};
use crate::error::ValidationError;
use crate::request::ProjectionRequest;
use ndarray::Array2;

/// A request that passed every input check.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// N x D matrix of finite values
    pub matrix: Array2<f64>,
    /// Normalised (trimmed, lowercase) algorithm identifier
    pub algorithm: String,
    /// Output dimensionality, 1 <= dim <= D
    pub dim: usize,
    pub seed: u64,
    pub params: HyperparameterOverrides,
}

impl ValidatedRequest {
    pub fn n_points(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Validate `request` against `limits` and convert it into a numeric matrix.
///
/// Pure: no side effects, no computation beyond the checks themselves.
pub fn validate(
    request: &ProjectionRequest,
    limits: &Limits,
) -> Result<ValidatedRequest, ValidationError> {
    let n = request.vectors.len();
    if n == 0 {
        return Err(ValidationError::EmptyDataset);
    }
    if n > limits.max_points {
        return Err(ValidationError::TooLarge {
            reason: format!("{} points exceeds the limit of {}", n, limits.max_points),
        });
    }

    let d = request.vectors[0].len();
    if d == 0 {
        return Err(ValidationError::EmptyDataset);
    }
    if d > limits.max_dimensions {
        return Err(ValidationError::TooLarge {
            reason: format!(
                "{} dimensions exceeds the limit of {}",
                d, limits.max_dimensions
            ),
        });
    }

    for (row, values) in request.vectors.iter().enumerate() {
        if values.len() != d {
            return Err(ValidationError::InconsistentDimensionality {
                row,
                expected: d,
                found: values.len(),
            });
        }
        if let Some(column) = values.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::InvalidNumericValue { row, column });
        }
    }

    // K <= D for every algorithm.
    if request.dim < 1 || request.dim as u64 > d as u64 {
        return Err(ValidationError::InvalidDimensionality {
            dim: request.dim,
            input_dim: d,
        });
    }

    let matrix = Array2::from_shape_fn((n, d), |(i, j)| request.vectors[i][j]);

    Ok(ValidatedRequest {
        matrix,
        algorithm: request.algo.trim().to_lowercase(),
        dim: request.dim as usize,
        // Two's-complement bit pattern; negative seeds are distinct valid seeds.
        seed: request.seed as u64,
        params: request.params.clone(),
    })
}
