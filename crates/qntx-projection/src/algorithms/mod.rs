//! Built-in projection capabilities.
//!
//! The pipeline reaches these only through [`Capability`](crate::registry::Capability);
//! nothing outside this module depends on their internals.

mod distance;
mod pca;
mod tsne;
mod umap;

pub use pca::Pca;
pub use tsne::Tsne;
pub use umap::Umap;
