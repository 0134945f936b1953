//! Hyperparameters, per-request algorithm configuration and process-wide defaults.

use crate::error::ValidationError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distance metric used for neighbourhood construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Cosine => "cosine",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "euclidean" => Ok(Metric::Euclidean),
            "cosine" => Ok(Metric::Cosine),
            other => Err(ValidationError::InvalidParameter {
                name: "metric",
                reason: format!("unknown metric '{}', expected euclidean or cosine", other),
            }),
        }
    }
}

/// Tunable settings controlling a projection algorithm.
///
/// A capability reads the fields relevant to it and ignores the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Neighbourhood size for graph-based methods
    pub n_neighbors: usize,
    /// Minimum distance between embedded points
    pub min_dist: f64,
    /// Effective scale of embedded points
    pub spread: f64,
    /// Optimisation epochs (0 = choose from dataset size)
    pub n_epochs: usize,
    /// Input-space distance metric
    pub metric: Metric,
    /// Effective number of neighbours for t-SNE
    pub perplexity: f64,
    /// Gradient descent iterations for iterative solvers
    pub iterations: usize,
    /// Initial optimiser step size
    pub learning_rate: f64,
    /// Attractive force multiplier during the early phase
    pub early_exaggeration: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_epochs: 0,
            metric: Metric::Euclidean,
            perplexity: 40.0,
            iterations: 600,
            learning_rate: 1.0,
            early_exaggeration: 4.0,
        }
    }
}

impl Hyperparameters {
    /// Reject settings no capability can honour.
    pub fn validate(&self) -> Result<(), ValidationError> {
        fn invalid(name: &'static str, reason: String) -> Result<(), ValidationError> {
            Err(ValidationError::InvalidParameter { name, reason })
        }

        if self.n_neighbors < 2 {
            return invalid("n_neighbors", format!("{} < 2", self.n_neighbors));
        }
        if !self.spread.is_finite() || self.spread <= 0.0 {
            return invalid("spread", format!("{} must be positive", self.spread));
        }
        if !self.min_dist.is_finite() || self.min_dist < 0.0 || self.min_dist > self.spread {
            return invalid(
                "min_dist",
                format!("{} must be within [0, spread={}]", self.min_dist, self.spread),
            );
        }
        if !self.perplexity.is_finite() || self.perplexity <= 0.0 {
            return invalid("perplexity", format!("{} must be positive", self.perplexity));
        }
        if self.iterations == 0 {
            return invalid("iterations", "must be at least 1".to_string());
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return invalid(
                "learning_rate",
                format!("{} must be positive", self.learning_rate),
            );
        }
        if !self.early_exaggeration.is_finite() || self.early_exaggeration < 1.0 {
            return invalid(
                "early_exaggeration",
                format!("{} must be at least 1", self.early_exaggeration),
            );
        }
        Ok(())
    }
}

/// Partial hyperparameters supplied by a request or by process-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperparameterOverrides {
    pub n_neighbors: Option<usize>,
    pub min_dist: Option<f64>,
    pub spread: Option<f64>,
    pub n_epochs: Option<usize>,
    pub metric: Option<Metric>,
    pub perplexity: Option<f64>,
    pub iterations: Option<usize>,
    pub learning_rate: Option<f64>,
    pub early_exaggeration: Option<f64>,
}

impl HyperparameterOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layer these overrides on top of `base`.
    pub fn apply(&self, base: &Hyperparameters) -> Hyperparameters {
        Hyperparameters {
            n_neighbors: self.n_neighbors.unwrap_or(base.n_neighbors),
            min_dist: self.min_dist.unwrap_or(base.min_dist),
            spread: self.spread.unwrap_or(base.spread),
            n_epochs: self.n_epochs.unwrap_or(base.n_epochs),
            metric: self.metric.unwrap_or(base.metric),
            perplexity: self.perplexity.unwrap_or(base.perplexity),
            iterations: self.iterations.unwrap_or(base.iterations),
            learning_rate: self.learning_rate.unwrap_or(base.learning_rate),
            early_exaggeration: self.early_exaggeration.unwrap_or(base.early_exaggeration),
        }
    }
}

/// Immutable settings for one projection invocation.
///
/// Built fresh per request by the dispatcher and dropped when the request completes.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmConfig {
    algorithm: String,
    n_components: usize,
    seed: u64,
    params: Hyperparameters,
}

impl AlgorithmConfig {
    pub fn new(
        algorithm: impl Into<String>,
        n_components: usize,
        seed: u64,
        params: Hyperparameters,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            n_components,
            seed,
            params,
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Output dimensionality K.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    /// Deterministic generator derived from the request seed.
    ///
    /// Capabilities must draw all randomness from here.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

/// Input size bounds enforced before the numeric matrix is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub max_points: usize,
    pub max_dimensions: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_points: 20_000,
            max_dimensions: 8_192,
        }
    }
}

/// Process-wide defaults, constructed once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectionDefaults {
    /// Per-algorithm hyperparameter overrides, keyed by algorithm identifier
    pub algorithms: BTreeMap<String, HyperparameterOverrides>,
    pub limits: Limits,
}

impl ProjectionDefaults {
    pub fn overrides_for(&self, algorithm: &str) -> Option<&HyperparameterOverrides> {
        self.algorithms
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(algorithm))
            .map(|(_, overrides)| overrides)
    }
}
