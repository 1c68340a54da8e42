//! Models command implementation.

use anyhow::Result;
use colored::Colorize;
use reverie_core::{DEFAULT_MODEL, ModelRegistry};
use serde_json::json;

/// List the registered dream models.
pub fn execute(json_output: bool) -> Result<()> {
    let models = ModelRegistry::all();

    if json_output {
        let model_list: Vec<_> = models
            .iter()
            .map(|config| {
                json!({
                    "id": config.model_type.id(),
                    "name": config.name,
                    "architecture": config.architecture.id(),
                    "layers": config.layers,
                    "description": config.description,
                    "is_default": config.model_type.id() == DEFAULT_MODEL,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&model_list)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Dream Models ({})", models.len()).bold().cyan());
    println!();
    println!("{:<12} {:<14} {:<28} {}", "ID", "Network", "Layers", "Default");
    println!("{}", "─".repeat(64));

    for config in models {
        let default_str =
            if config.model_type.id() == DEFAULT_MODEL { "(default)".green() } else { "".dimmed() };
        println!(
            "{:<12} {:<14} {:<28} {}",
            config.model_type.id().cyan(),
            config.name,
            config.layers.join(", "),
            default_str
        );
        println!("  {}", config.description.dimmed());
    }
    println!();

    Ok(())
}
