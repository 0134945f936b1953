//! # QNTX Projection Core
//!
//! Projects batches of high-dimensional vectors into a low-dimensional coordinate space
//! for visualisation.
//!
//! - **validate**: request checks and conversion to a numeric matrix
//! - **dispatch**: identifier -> capability + immutable [`AlgorithmConfig`]
//! - **executor**: timed invocation with output shape enforcement
//! - **registry**: the [`Capability`] contract and named capabilities
//! - **algorithms**: built-in `umap`, `tsne` and `pca`
//!
//! ## Usage
//!
//! ```rust
//! use qntx_projection::{ProjectionRequest, Projector};
//!
//! let vectors: Vec<Vec<f64>> = (0..10)
//!     .map(|i| (0..5).map(|j| (i * 5 + j) as f64).collect())
//!     .collect();
//!
//! let projector = Projector::builtin();
//! let result = projector.project(&ProjectionRequest::new(vectors)).unwrap();
//! assert_eq!(result.coords.len(), 10);
//! assert!(result.coords.iter().all(|row| row.len() == 2));
//! ```

pub mod algorithms;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod projector;
pub mod registry;
pub mod request;
pub mod validate;

pub use config::{
    AlgorithmConfig, HyperparameterOverrides, Hyperparameters, Limits, Metric, ProjectionDefaults,
};
pub use dispatch::{AlgorithmInfo, Dispatch, Dispatcher};
pub use error::{CapabilityError, ErrorKind, ProjectionError, Result, ValidationError};
pub use executor::{Executor, RetryPolicy};
pub use projector::{Prepared, Projector};
pub use registry::{Capability, Registry};
pub use request::{ProjectionRequest, ProjectionResult};
pub use validate::{validate, ValidatedRequest};
