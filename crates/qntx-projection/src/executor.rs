//! Timed invocation of a resolved capability with output shape enforcement.

use crate::dispatch::Dispatch;
use crate::error::{CapabilityError, ProjectionError, Result};
use crate::request::ProjectionResult;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

/// Opt-in retries for transient capability failures. Disabled by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

/// Runs a capability once (plus any opted-in transient retries) and packages the result.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    retry: RetryPolicy,
}

impl Executor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn execute(&self, data: ArrayView2<'_, f64>, dispatch: &Dispatch) -> Result<ProjectionResult> {
        let config = &dispatch.config;
        let algorithm = config.algorithm();
        let (n_points, input_dim) = data.dim();
        let k = config.n_components();

        let mut attempt = 0u32;
        let start = Instant::now();
        let output = loop {
            match dispatch.capability.project(data, config) {
                Ok(output) => break output,
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        algorithm,
                        attempt,
                        max_retries = self.retry.max_retries,
                        "transient projection failure, retrying: {}",
                        e
                    );
                }
                Err(source) => {
                    error!(algorithm, n_points, "projection failed: {}", source);
                    return Err(ProjectionError::Computation {
                        algorithm: algorithm.to_string(),
                        source,
                    });
                }
            }
        };
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (rows, cols) = output.dim();
        if rows != n_points || cols != k {
            error!(
                algorithm,
                expected_rows = n_points,
                expected_cols = k,
                found_rows = rows,
                found_cols = cols,
                "capability violated output shape contract"
            );
            return Err(ProjectionError::ShapeMismatch {
                algorithm: algorithm.to_string(),
                expected_rows: n_points,
                expected_cols: k,
                found_rows: rows,
                found_cols: cols,
            });
        }

        if let Some(((row, column), _)) = output.indexed_iter().find(|(_, v)| !v.is_finite()) {
            error!(algorithm, row, column, "capability produced non-finite output");
            return Err(ProjectionError::Computation {
                algorithm: algorithm.to_string(),
                source: CapabilityError::Numerical(format!(
                    "non-finite coordinate at row {}, column {}",
                    row, column
                )),
            });
        }

        info!(
            algorithm,
            n_points, input_dim, dim = k, elapsed_ms, "projection complete"
        );

        Ok(ProjectionResult {
            coords: output.outer_iter().map(|row| row.to_vec()).collect(),
            elapsed_ms,
        })
    }
}
