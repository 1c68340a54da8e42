//! Reverie core: turns photographs into dream images.
//!
//! This crate ties the pieces together:
//!
//! - [`codec`]: raster image to normalized tensor and back.
//! - [`service`]: the request pipeline over a shared model cache.
//! - [`config`]: TOML configuration discovery.
//!
//! # Example
//!
//! ```no_run
//! use reverie_core::{DreamConfig, DreamParams, DreamService};
//!
//! let config = DreamConfig::discover_and_load().unwrap_or_default();
//! let service = DreamService::from_config(&config);
//! let image = image::open("photo.jpg").unwrap().to_rgb8();
//! let outcome = service.generate(&image, "inception", &DreamParams::default()).unwrap();
//! outcome.image.save("photo_dream.png").unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod service;

use burn::backend::{Autodiff, NdArray};

pub use config::{ConfigError, DreamConfig};
pub use reverie_abstraction::{DreamError, DreamResult};
pub use reverie_models::{CacheStats, DEFAULT_MODEL, ModelConfig, ModelRegistry};
pub use service::{DreamOutcome, DreamParams, DreamService};

/// CPU backend with reverse-mode autodiff, used by the binary.
pub type DreamBackend = Autodiff<NdArray<f32>>;
