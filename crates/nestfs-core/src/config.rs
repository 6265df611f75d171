//! Engine configuration types.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::VfsError;

/// Which archive lister to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackendKind {
    /// Use the external tool when it is on `PATH`, the builtin reader otherwise.
    #[default]
    Auto,
    /// Always shell out to the external archive tool.
    External,
    /// Always use the builtin zip/tar reader.
    Builtin,
}

/// Configuration shared by the lister, transfer engine and size scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct EngineConfig {
    /// How many path segments the archive resolver may strip.
    #[builder(default = "20")]
    pub max_resolve_depth: usize,

    /// Program used to list and extract archives.
    #[builder(default = "\"7z\".to_string()")]
    pub archive_tool: String,

    /// Archive lister selection.
    #[builder(default)]
    pub archive_backend: ArchiveBackendKind,

    /// Maximum number of cached directory sizes.
    #[builder(default = "1000")]
    pub size_cache_capacity: usize,

    /// Age after which a cached size is stale.
    #[builder(default = "300")]
    pub size_cache_ttl_secs: u64,

    /// Maximum number of size computations running at once.
    #[builder(default = "4")]
    pub max_concurrent_sizes: usize,

    /// Buffer size of transfer event channels.
    #[builder(default = "100")]
    pub progress_channel_size: usize,
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_resolve_depth == Some(0) {
            return Err("max_resolve_depth must be at least 1".to_string());
        }
        if self.size_cache_capacity == Some(0) {
            return Err("size_cache_capacity must be at least 1".to_string());
        }
        if self.max_concurrent_sizes == Some(0) {
            return Err("max_concurrent_sizes must be at least 1".to_string());
        }
        if self.progress_channel_size == Some(0) {
            return Err("progress_channel_size must be at least 1".to_string());
        }
        if let Some(ref tool) = self.archive_tool {
            if tool.trim().is_empty() {
                return Err("archive_tool cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Time-to-live of size cache entries.
    pub fn size_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.size_cache_ttl_secs)
    }

    /// Check a config that was not produced by the builder (e.g. deserialized).
    pub fn validate(&self) -> Result<(), VfsError> {
        EngineConfigBuilder {
            max_resolve_depth: Some(self.max_resolve_depth),
            archive_tool: Some(self.archive_tool.clone()),
            archive_backend: Some(self.archive_backend),
            size_cache_capacity: Some(self.size_cache_capacity),
            size_cache_ttl_secs: Some(self.size_cache_ttl_secs),
            max_concurrent_sizes: Some(self.max_concurrent_sizes),
            progress_channel_size: Some(self.progress_channel_size),
        }
        .validate()
        .map_err(|message| VfsError::InvalidConfig { message })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_resolve_depth: 20,
            archive_tool: "7z".to_string(),
            archive_backend: ArchiveBackendKind::Auto,
            size_cache_capacity: 1000,
            size_cache_ttl_secs: 300,
            max_concurrent_sizes: 4,
            progress_channel_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .size_cache_capacity(10usize)
            .max_concurrent_sizes(2usize)
            .archive_backend(ArchiveBackendKind::Builtin)
            .build()
            .unwrap();

        assert_eq!(config.size_cache_capacity, 10);
        assert_eq!(config.max_concurrent_sizes, 2);
        assert_eq!(config.archive_backend, ArchiveBackendKind::Builtin);
        assert_eq!(config.max_resolve_depth, 20);
        assert_eq!(config.archive_tool, "7z");
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = EngineConfig::builder().build().unwrap();
        assert_eq!(built, EngineConfig::default());
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = EngineConfig::builder().max_concurrent_sizes(0usize).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_deserialized() {
        let config = EngineConfig {
            archive_tool: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VfsError::InvalidConfig { .. })
        ));
        assert!(EngineConfig::default().validate().is_ok());
    }
}
