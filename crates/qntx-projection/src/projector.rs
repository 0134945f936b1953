//! Validator -> Dispatcher -> Executor pipeline.

use crate::config::ProjectionDefaults;
use crate::dispatch::{AlgorithmInfo, Dispatch, Dispatcher};
use crate::error::Result;
use crate::executor::{Executor, RetryPolicy};
use crate::registry::Registry;
use crate::request::{ProjectionRequest, ProjectionResult};
use crate::validate::{validate, ValidatedRequest};
use std::sync::Arc;
use tracing::debug;

/// A request that passed validation and resolved to a capability, ready to run.
pub struct Prepared {
    pub request: ValidatedRequest,
    pub dispatch: Dispatch,
}

/// Stateless projection pipeline. Safe to share across threads; each call owns its data.
#[derive(Debug, Clone)]
pub struct Projector {
    dispatcher: Dispatcher,
    executor: Executor,
}

impl Projector {
    pub fn new(registry: Registry, defaults: Arc<ProjectionDefaults>, retry: RetryPolicy) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry, defaults),
            executor: Executor::new(retry),
        }
    }

    /// Built-in capabilities, default configuration, no retries.
    pub fn builtin() -> Self {
        Self::new(Registry::builtin(), Arc::default(), RetryPolicy::default())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn algorithms(&self) -> Vec<AlgorithmInfo> {
        self.dispatcher.describe()
    }

    /// Validate, resolve and run one request to completion.
    ///
    /// Every validation failure, including an unknown algorithm, is returned before any
    /// capability is invoked.
    pub fn project(&self, request: &ProjectionRequest) -> Result<ProjectionResult> {
        let prepared = self.prepare(request)?;
        self.run(&prepared)
    }

    /// Validation and dispatch only. Cheap; no capability is invoked.
    pub fn prepare(&self, request: &ProjectionRequest) -> Result<Prepared> {
        let validated = validate(request, &self.dispatcher.defaults().limits)?;
        let dispatch = self.dispatcher.resolve(&validated)?;

        debug!(
            algorithm = %validated.algorithm,
            n_points = validated.n_points(),
            input_dim = validated.input_dim(),
            "dispatching projection"
        );

        Ok(Prepared {
            request: validated,
            dispatch,
        })
    }

    /// Execute a prepared request.
    pub fn run(&self, prepared: &Prepared) -> Result<ProjectionResult> {
        self.executor
            .execute(prepared.request.matrix.view(), &prepared.dispatch)
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::builtin()
    }
}
