//! Algorithm dispatch: identifier + parameters -> capability + immutable config.

use crate::config::{AlgorithmConfig, Hyperparameters, ProjectionDefaults};
use crate::error::ValidationError;
use crate::registry::{Capability, Registry};
use crate::validate::ValidatedRequest;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A resolved capability ready to run.
pub struct Dispatch {
    pub capability: Arc<dyn Capability>,
    pub config: AlgorithmConfig,
}

/// Description of a registered algorithm and its effective defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmInfo {
    pub name: String,
    pub description: String,
    pub defaults: Hyperparameters,
}

/// Maps identifiers to capabilities, layering defaults into an [`AlgorithmConfig`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Registry,
    defaults: Arc<ProjectionDefaults>,
}

impl Dispatcher {
    pub fn new(registry: Registry, defaults: Arc<ProjectionDefaults>) -> Self {
        Self { registry, defaults }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn defaults(&self) -> &ProjectionDefaults {
        &self.defaults
    }

    /// Resolve the capability and configuration for a validated request.
    ///
    /// Precedence, later wins: capability defaults, process-wide overrides, request
    /// overrides, then the request's `dim` and `seed`.
    pub fn resolve(&self, request: &ValidatedRequest) -> Result<Dispatch, ValidationError> {
        let capability = self.registry.get(&request.algorithm).ok_or_else(|| {
            ValidationError::UnknownAlgorithm {
                name: request.algorithm.clone(),
                available: self.registry.names().join(", "),
            }
        })?;

        if let Some(max_points) = capability.max_points() {
            if request.n_points() > max_points {
                return Err(ValidationError::TooLarge {
                    reason: format!(
                        "{} accepts at most {} points, got {}",
                        request.algorithm,
                        max_points,
                        request.n_points()
                    ),
                });
            }
        }

        let params = request
            .params
            .apply(&self.effective_defaults(&request.algorithm, capability.as_ref()));
        params.validate()?;

        debug!(
            algorithm = %request.algorithm,
            dim = request.dim,
            seed = request.seed,
            "resolved algorithm config"
        );

        Ok(Dispatch {
            capability,
            config: AlgorithmConfig::new(
                request.algorithm.clone(),
                request.dim,
                request.seed,
                params,
            ),
        })
    }

    /// All registered algorithms with their effective defaults.
    pub fn describe(&self) -> Vec<AlgorithmInfo> {
        self.registry
            .iter()
            .map(|(name, capability)| AlgorithmInfo {
                name: name.to_string(),
                description: capability.description().to_string(),
                defaults: self.effective_defaults(name, capability.as_ref()),
            })
            .collect()
    }

    fn effective_defaults(&self, name: &str, capability: &dyn Capability) -> Hyperparameters {
        let builtin = capability.default_hyperparameters();
        match self.defaults.overrides_for(name) {
            Some(overrides) => overrides.apply(&builtin),
            None => builtin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HyperparameterOverrides, Limits};
    use crate::request::ProjectionRequest;
    use crate::validate::validate;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn validated(req: ProjectionRequest) -> ValidatedRequest {
        validate(&req, &Limits::default()).unwrap()
    }

    fn sample() -> Vec<Vec<f64>> {
        vec![vec![0.0, 1.0, 2.0]; 4]
    }

    #[test]
    fn test_unknown_algorithm() {
        let dispatcher = Dispatcher::new(Registry::builtin(), Arc::default());
        let req = validated(ProjectionRequest::new(sample()).with_algo("nonexistent-algo"));
        match dispatcher.resolve(&req) {
            Err(ValidationError::UnknownAlgorithm { name, available }) => {
                assert_eq!(name, "nonexistent-algo");
                assert_eq!(available, "pca, tsne, umap");
            }
            other => panic!("expected unknown algorithm, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_request_dim_and_seed_always_win() {
        let mut algorithms = BTreeMap::new();
        algorithms.insert(
            "umap".to_string(),
            HyperparameterOverrides {
                n_neighbors: Some(5),
                min_dist: Some(0.3),
                ..Default::default()
            },
        );
        let defaults = ProjectionDefaults {
            algorithms,
            limits: Limits::default(),
        };
        let dispatcher = Dispatcher::new(Registry::builtin(), Arc::new(defaults));

        let req = validated(
            ProjectionRequest::new(sample())
                .with_dim(3)
                .with_seed(7)
                .with_params(HyperparameterOverrides {
                    min_dist: Some(0.5),
                    ..Default::default()
                }),
        );
        let dispatch = dispatcher.resolve(&req).unwrap();
        let config = dispatch.config;

        assert_eq!(config.algorithm(), "umap");
        assert_eq!(config.n_components(), 3);
        assert_eq!(config.seed(), 7);
        assert_eq!(config.params().n_neighbors, 5);
        assert_eq!(config.params().min_dist, 0.5);
    }

    #[test]
    fn test_capability_defaults_apply() {
        let dispatcher = Dispatcher::new(Registry::builtin(), Arc::default());
        let req = validated(ProjectionRequest::new(sample()).with_algo("tsne"));
        let config = dispatcher.resolve(&req).unwrap().config;
        assert_eq!(config.params().perplexity, 40.0);
        assert_eq!(config.params().learning_rate, 100.0);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let dispatcher = Dispatcher::new(Registry::builtin(), Arc::default());
        let req = validated(ProjectionRequest::new(sample()).with_params(
            HyperparameterOverrides {
                n_neighbors: Some(0),
                ..Default::default()
            },
        ));
        assert!(matches!(
            dispatcher.resolve(&req),
            Err(ValidationError::InvalidParameter {
                name: "n_neighbors",
                ..
            })
        ));
    }

    #[test]
    fn test_describe_lists_registered() {
        let dispatcher = Dispatcher::new(Registry::builtin(), Arc::default());
        let names: Vec<String> = dispatcher.describe().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["pca", "tsne", "umap"]);
    }
}
