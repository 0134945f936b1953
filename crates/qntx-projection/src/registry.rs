//! Capability contract and the registry of named capabilities.

use crate::algorithms::{Pca, Tsne, Umap};
use crate::config::{AlgorithmConfig, Hyperparameters};
use crate::error::CapabilityError;
use ndarray::{Array2, ArrayView2};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One projection algorithm.
///
/// Maps an N x D matrix to an N x K matrix, K = `config.n_components()`. All randomness
/// must come from `config.rng()` so equal seeds give equal output.
pub trait Capability: Send + Sync {
    /// Short human-readable description.
    fn description(&self) -> &str;

    /// Built-in hyperparameters used when neither configuration nor request override them.
    fn default_hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::default()
    }

    /// Largest batch this capability accepts, if bounded below the global limit.
    fn max_points(&self) -> Option<usize> {
        None
    }

    fn project(
        &self,
        data: ArrayView2<'_, f64>,
        config: &AlgorithmConfig,
    ) -> Result<Array2<f64>, CapabilityError>;
}

/// Capabilities keyed by lowercase identifier.
#[derive(Clone, Default)]
pub struct Registry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `umap`, `tsne` and `pca` capabilities.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("umap", Umap);
        registry.register("tsne", Tsne);
        registry.register("pca", Pca);
        registry
    }

    /// Add or replace a capability. Returns the one it replaced, if any.
    pub fn register<C>(&mut self, name: &str, capability: C) -> Option<Arc<dyn Capability>>
    where
        C: Capability + 'static,
    {
        self.insert(name, Arc::new(capability))
    }

    pub fn insert(
        &mut self,
        name: &str,
        capability: Arc<dyn Capability>,
    ) -> Option<Arc<dyn Capability>> {
        self.capabilities
            .insert(normalize(name), capability)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(&normalize(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(&normalize(name))
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Capability>)> {
        self.capabilities.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Identifiers are trimmed and case-insensitive.
fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("capabilities", &self.names())
            .finish()
    }
}
