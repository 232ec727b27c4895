//! Configuration module for vispipe-rs
//!
//! This module handles the pipeline configuration file:
//! - Pipeline-wide defaults (global release flag, split mode)
//! - Logging filter used by the demo binary
//! - The demo scenario (see [`DemoConfig`])
//!
//! # Example
//!
//! ```toml
//! global_release_data = false
//! split_mode = "block"
//! log_filter = "info,vispipe_rs=debug"
//!
//! [demo]
//! whole_extent = [0, 63, 0, 63, 0, 0]
//! number_of_pieces = 4
//! ghost_level = 1
//! halo_radius = 1
//! fill_value = 1.0
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, VisPipeError};
use crate::pipeline::SplitMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default logging filter
pub const DEFAULT_LOG_FILTER: &str = "info,vispipe_rs=debug";

/// Top-level configuration file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Release every node input after use
    pub global_release_data: bool,
    /// Split mode of the extent translator given to new data objects
    pub split_mode: SplitMode,
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
    pub demo: DemoConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            global_release_data: false,
            split_mode: SplitMode::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            demo: DemoConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VisPipeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Failed to parse config file {:?}", path)))
    }

    /// Load a configuration file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save the configuration to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))
    }

    fn validate(&self) -> Result<()> {
        self.demo.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Extent;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(!config.global_release_data);
        assert_eq!(config.split_mode, SplitMode::Block);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            split_mode = "z_slab"

            [demo]
            number_of_pieces = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.split_mode, SplitMode::ZSlab);
        assert_eq!(config.demo.number_of_pieces, 8);
        assert_eq!(config.demo.halo_radius, DemoConfig::default().halo_radius);
    }

    #[test]
    fn test_invalid_demo_is_rejected() {
        let err = PipelineConfig::from_toml_str("[demo]\nnumber_of_pieces = 0\n").unwrap_err();
        assert!(err.to_string().contains("number_of_pieces"));
    }

    #[test]
    fn test_unknown_split_mode_is_rejected() {
        assert!(PipelineConfig::from_toml_str("split_mode = \"diagonal\"").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("vispipe.toml");

        let mut config = PipelineConfig::default();
        config.global_release_data = true;
        config.demo.whole_extent = Extent::new(0, 15, 0, 7, 0, 3);
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::load_or_default(dir.path().join("absent.toml"));
        assert_eq!(config, PipelineConfig::default());
    }
}
