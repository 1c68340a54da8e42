//! Reverie CLI - Command-line interface for dream image generation
//!
//! This CLI provides a `reverie` command that runs DeepDream-style gradient
//! ascent over pretrained networks and lists the available dream models.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::dream::{self, DreamArgs};
use commands::models;

/// Reverie CLI - Dream images from pretrained networks
///
/// Reverie amplifies the patterns a pretrained image classifier sees in a
/// photograph by nudging its pixels to excite selected network layers.
#[derive(Parser, Debug)]
#[command(
    name = "reverie",
    author,
    version,
    about = "Reverie - DeepDream image generation",
    long_about = "Reverie turns photographs into dream-like images by running gradient ascent on the activations of pretrained InceptionV3 or VGG16 layers."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Extra configuration file, applied over ~/.reverie/config.toml and ./.reverierc
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dream an image
    ///
    /// Decodes the input, downscales it to the dimension bound, runs the
    /// selected model's gradient ascent and writes the result as PNG.
    Dream(DreamArgs),

    /// List available dream models
    Models {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let dream_config = config::load_config(args.config.as_deref())?;

    // Initialize tracing
    let level = parse_level(
        args.log_level.as_deref().or(dream_config.log_level.as_deref()).unwrap_or("info"),
    );
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Dream(dream_args) => dream::execute(dream_args, &dream_config).await?,
        Command::Models { json } => models::execute(json)?,
    }

    Ok(())
}
