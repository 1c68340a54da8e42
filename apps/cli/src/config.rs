//! CLI configuration loading and merging.

use anyhow::{Context, Result};
use reverie_core::DreamConfig;
use std::path::Path;

/// Load and merge CLI configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (handled by clap)
/// 2. Explicit `--config` file
/// 3. Local config file (./.reverierc)
/// 4. Global config file (~/.reverie/config.toml)
/// 5. Defaults
pub fn load_config(explicit: Option<&Path>) -> Result<DreamConfig> {
    let mut config = DreamConfig::discover_and_load().context("Failed to load configuration")?;

    if let Some(path) = explicit {
        let overlay = DreamConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        config.merge(&overlay);
    }

    Ok(config)
}
