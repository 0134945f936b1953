//! QNTX Reduce Plugin
//!
//! gRPC front end for [`qntx_projection`]: projects embedding vectors to 2D/3D coordinates
//! for visualisation. Also answers the REST-style routes through `HandleHttp`.

pub mod config;
pub mod handlers;
#[cfg(feature = "python")]
pub mod python;
pub mod service;

pub mod proto {
    tonic::include_proto!("qntx.projection");
}

pub use config::{ConfigError, PluginConfig, ServiceConfig};
pub use handlers::HandlerContext;
pub use service::ProjectionPluginService;

use qntx_projection::Registry;

/// Built-in capabilities plus any enabled by cargo features.
pub fn registry() -> Registry {
    #[allow(unused_mut)]
    let mut registry = Registry::builtin();
    #[cfg(feature = "python")]
    registry.register(python::UMAP_LEARN, python::UmapLearn);
    registry
}
