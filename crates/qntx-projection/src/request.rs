//! Request and result types exchanged with the transport layer.

use crate::config::HyperparameterOverrides;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ALGORITHM: &str = "umap";
pub const DEFAULT_DIM: i64 = 2;
pub const DEFAULT_SEED: i64 = 42;

fn default_algo() -> String {
    DEFAULT_ALGORITHM.to_string()
}
fn default_dim() -> i64 {
    DEFAULT_DIM
}
fn default_seed() -> i64 {
    DEFAULT_SEED
}

/// A batch of vectors to project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRequest {
    /// N rows of D values each
    pub vectors: Vec<Vec<f64>>,
    /// Algorithm identifier
    #[serde(default = "default_algo")]
    pub algo: String,
    /// Output dimensionality K
    #[serde(default = "default_dim")]
    pub dim: i64,
    /// Seed for the pseudo-random source
    #[serde(default = "default_seed")]
    pub seed: i64,
    /// Optional hyperparameter overrides
    #[serde(default, skip_serializing_if = "HyperparameterOverrides::is_empty")]
    pub params: HyperparameterOverrides,
}

impl ProjectionRequest {
    /// Request with the default algorithm, dimensionality and seed.
    pub fn new(vectors: Vec<Vec<f64>>) -> Self {
        Self {
            vectors,
            algo: default_algo(),
            dim: DEFAULT_DIM,
            seed: DEFAULT_SEED,
            params: HyperparameterOverrides::default(),
        }
    }

    pub fn with_algo(mut self, algo: impl Into<String>) -> Self {
        self.algo = algo.into();
        self
    }

    pub fn with_dim(mut self, dim: i64) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_params(mut self, params: HyperparameterOverrides) -> Self {
        self.params = params;
        self
    }
}

/// Projected coordinates, one row per input row, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub coords: Vec<Vec<f64>>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_defaults() {
        let req: ProjectionRequest = serde_json::from_str(r#"{"vectors": [[1.0, 2.0]]}"#).unwrap();
        assert_eq!(req, ProjectionRequest::new(vec![vec![1.0, 2.0]]));
        assert_eq!(req.algo, "umap");
        assert_eq!(req.dim, 2);
        assert_eq!(req.seed, 42);
    }

    #[test]
    fn test_json_with_params() {
        let req: ProjectionRequest = serde_json::from_str(
            r#"{"vectors": [[1.0]], "algo": "tsne", "dim": 3, "seed": -7, "params": {"perplexity": 5.0}}"#,
        )
        .unwrap();
        assert_eq!(req.algo, "tsne");
        assert_eq!(req.dim, 3);
        assert_eq!(req.seed, -7);
        assert_eq!(req.params.perplexity, Some(5.0));
    }

    #[test]
    fn test_result_wire_shape() {
        let result = ProjectionResult {
            coords: vec![vec![0.5, -1.0]],
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"coords": [[0.5, -1.0]], "elapsed_ms": 12})
        );
    }
}
