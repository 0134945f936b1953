//! Plugin configuration: a JSON file plus CLI overrides, loaded once at startup.

use qntx_projection::{ProjectionDefaults, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default gRPC message cap, matching the plugin host.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Admission control and deadline settings for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Projections allowed to compute at once (0 = available parallelism)
    pub max_concurrent: usize,
    /// How long a request may wait for a free slot before it is rejected
    pub queue_timeout_ms: Option<u64>,
    /// Deadline for a single projection, queueing excluded
    pub timeout_ms: Option<u64>,
    /// Retries for transient capability failures
    pub max_retries: u32,
    pub max_message_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            queue_timeout_ms: None,
            timeout_ms: None,
            max_retries: 0,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Effective concurrency, resolving 0 to the machine's parallelism.
    pub fn concurrency(&self) -> usize {
        if self.max_concurrent > 0 {
            return self.max_concurrent;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn queue_timeout(&self) -> Option<Duration> {
        self.queue_timeout_ms.map(Duration::from_millis)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
        }
    }
}

/// Complete plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    pub defaults: ProjectionDefaults,
    pub service: ServiceConfig,
}

impl PluginConfig {
    /// Load from a JSON file. Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI flags on top of file values.
    pub fn with_overrides(mut self, max_concurrent: Option<usize>, timeout_ms: Option<u64>) -> Self {
        if let Some(n) = max_concurrent {
            self.service.max_concurrent = n;
        }
        if let Some(ms) = timeout_ms {
            self.service.timeout_ms = Some(ms);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.defaults.limits;
        if limits.max_points == 0 || limits.max_dimensions == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_points and limits.max_dimensions must be positive".to_string(),
            ));
        }
        if self.service.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "service.max_message_bytes must be positive".to_string(),
            ));
        }
        if self.service.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "service.timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "defaults": {{
                    "algorithms": {{ "umap": {{ "n_neighbors": 30, "metric": "cosine" }} }},
                    "limits": {{ "max_points": 5000 }}
                }},
                "service": {{ "max_concurrent": 2, "timeout_ms": 30000 }}
            }}"#
        )
        .unwrap();

        let config = PluginConfig::load(file.path()).unwrap();
        let umap = config.defaults.overrides_for("umap").unwrap();
        assert_eq!(umap.n_neighbors, Some(30));
        assert_eq!(umap.metric, Some(qntx_projection::Metric::Cosine));
        assert_eq!(config.defaults.limits.max_points, 5000);
        assert_eq!(config.defaults.limits.max_dimensions, 8192);
        assert_eq!(config.service.concurrency(), 2);
        assert_eq!(config.service.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.service.queue_timeout(), None);
        assert_eq!(config.service.max_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reduce.json");
        std::fs::write(&path, r#"{"service": {"max_concurent": 2}}"#).unwrap();

        let err = PluginConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PluginConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reduce.json");
        std::fs::write(&path, r#"{"defaults": {"limits": {"max_points": 0}}}"#).unwrap();
        assert!(matches!(
            PluginConfig::load(&path).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = PluginConfig::default().with_overrides(Some(3), Some(500));
        assert_eq!(config.service.max_concurrent, 3);
        assert_eq!(config.service.timeout_ms, Some(500));

        let untouched = PluginConfig::default().with_overrides(None, None);
        assert_eq!(untouched, PluginConfig::default());
        assert!(untouched.service.concurrency() >= 1);
    }
}
