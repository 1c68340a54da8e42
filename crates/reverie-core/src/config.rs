//! Configuration file support.
//!
//! Settings come from TOML files. The global file (`~/.reverie/config.toml`)
//! is loaded first and the local `.reverierc` overrides it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides the configured weights directory.
pub const WEIGHTS_DIR_ENV: &str = "REVERIE_WEIGHTS_DIR";

/// Dream configuration. Every field is optional; unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamConfig {
    /// Default model identifier.
    #[serde(default)]
    pub model: Option<String>,

    /// Default number of optimizer steps.
    #[serde(default)]
    pub steps: Option<usize>,

    /// Default step size.
    #[serde(default)]
    pub step_size: Option<f32>,

    /// Default bound on the larger image side.
    #[serde(default)]
    pub max_dimension: Option<u32>,

    /// Directory holding pretrained weight records.
    #[serde(default)]
    pub weights_dir: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl DreamConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// The per-user Reverie directory (`~/.reverie`).
    pub fn home_dir() -> PathBuf {
        std::env::var("HOME").map_or_else(|_| PathBuf::from("."), PathBuf::from).join(".reverie")
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".reverierc")
    }

    /// Discover and load configuration files.
    ///
    /// Loads configuration from:
    /// 1. Global config (~/.reverie/config.toml)
    /// 2. Local config (./.reverierc)
    ///
    /// Local config overrides global config. Missing files are skipped; files
    /// that exist but cannot be read or parsed are reported.
    pub fn discover_and_load() -> ConfigResult<Self> {
        Self::load_layers(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Loads each existing file in `paths` in order, later files overriding earlier ones.
    pub fn load_layers(paths: &[PathBuf]) -> ConfigResult<Self> {
        let mut config = Self::default();
        for path in paths {
            match Self::load_from_file(path) {
                Ok(layer) => config.merge(&layer),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref model) = other.model {
            self.model = Some(model.clone());
        }
        if let Some(steps) = other.steps {
            self.steps = Some(steps);
        }
        if let Some(step_size) = other.step_size {
            self.step_size = Some(step_size);
        }
        if let Some(max_dimension) = other.max_dimension {
            self.max_dimension = Some(max_dimension);
        }
        if let Some(ref weights_dir) = other.weights_dir {
            self.weights_dir = Some(weights_dir.clone());
        }
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
    }

    /// Directory to load pretrained weights from.
    ///
    /// `REVERIE_WEIGHTS_DIR` wins over the configured value, which wins over
    /// `~/.reverie/weights`.
    pub fn resolved_weights_dir(&self) -> PathBuf {
        Self::resolve_weights_dir(std::env::var_os(WEIGHTS_DIR_ENV).map(PathBuf::from), self)
    }

    fn resolve_weights_dir(env_override: Option<PathBuf>, config: &Self) -> PathBuf {
        env_override
            .or_else(|| config.weights_dir.clone())
            .unwrap_or_else(|| Self::home_dir().join("weights"))
    }
}
