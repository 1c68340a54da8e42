//! Dream command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reverie_core::{
    DEFAULT_MODEL, DreamBackend, DreamConfig, DreamOutcome, DreamParams, DreamService, codec,
};
use reverie_zoo::FileWeightProvider;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Arguments of `reverie dream`.
#[derive(Args, Debug)]
pub struct DreamArgs {
    /// Input image (any format the image crate can decode)
    pub input: PathBuf,

    /// Output PNG path (defaults to <input stem>_dream.png next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Dream model (inception, vgg16)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of gradient-ascent steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Gradient-ascent step size
    #[arg(long)]
    pub step_size: Option<f32>,

    /// Bound on the larger image side before dreaming
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Directory holding pretrained weights (overrides REVERIE_WEIGHTS_DIR)
    #[arg(long)]
    pub weights_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the dream command.
pub async fn execute(args: DreamArgs, config: &DreamConfig) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let image = codec::decode(&bytes)
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;

    let params = resolve_params(&args, config);
    let model_id = args
        .model
        .clone()
        .or_else(|| config.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let output = args.output.clone().unwrap_or_else(|| default_output_path(&args.input));

    let service = Arc::new(match args.weights_dir {
        Some(ref dir) => {
            DreamService::<DreamBackend>::new(Arc::new(FileWeightProvider::new(dir)), Default::default())
        }
        None => DreamService::from_config(config),
    });

    let spinner = (!args.json).then(|| {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ").template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Dreaming with {} ({} steps)...", model_id.cyan(), params.steps));
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    });

    let result = Arc::clone(&service).generate_blocking_task(image, model_id, params).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let outcome = result?;

    let stats = service.cache_stats();
    debug!(
        builds = stats.total_builds,
        hits = stats.total_hits,
        hit_rate = stats.hit_rate(),
        "Model cache"
    );

    let png = codec::encode_png(&outcome.image)?;
    std::fs::write(&output, png).with_context(|| format!("Failed to write {}", output.display()))?;

    print_summary(&outcome, &output, &params, args.json)
}

fn resolve_params(args: &DreamArgs, config: &DreamConfig) -> DreamParams {
    let defaults = DreamParams::from_config(config);
    DreamParams {
        steps: args.steps.unwrap_or(defaults.steps),
        step_size: args.step_size.unwrap_or(defaults.step_size),
        max_dimension: args.max_dimension.unwrap_or(defaults.max_dimension),
    }
}

/// `<dir>/<stem>_dream.png` for an input at `<dir>/<stem>.<ext>`.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().map_or_else(|| "image".into(), |s| s.to_string_lossy());
    input.with_file_name(format!("{stem}_dream.png"))
}

fn print_summary(
    outcome: &DreamOutcome,
    output: &Path,
    params: &DreamParams,
    json_output: bool,
) -> Result<()> {
    let (width, height) = outcome.image.dimensions();

    if json_output {
        let summary = json!({
            "output": output.display().to_string(),
            "model": outcome.model_id,
            "loss": outcome.loss,
            "steps": params.steps,
            "step_size": params.step_size,
            "original_size": [outcome.original_size.0, outcome.original_size.1],
            "size": [width, height],
            "elapsed_ms": u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} {}", "✓ Dream written to".green(), output.display().to_string().bold());
    println!("  Model:  {}", outcome.model_id.cyan());
    println!("  Loss:   {:.4}", outcome.loss);
    println!(
        "  Size:   {width}x{height} {}",
        format!("(from {}x{})", outcome.original_size.0, outcome.original_size.1).dimmed()
    );
    println!("  Time:   {:.2}s", outcome.elapsed.as_secs_f64());

    Ok(())
}
