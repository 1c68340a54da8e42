//! End-to-end dream pipeline.

use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;
use reverie_abstraction::{DreamError, DreamResult, WeightProvider};
use reverie_models::{CacheStats, DreamCache, ModelConfig, ModelRegistry};
use reverie_zoo::FileWeightProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::DreamBackend;
use crate::codec::{self, DEFAULT_MAX_DIMENSION};
use crate::config::DreamConfig;

/// Default number of optimizer steps.
pub const DEFAULT_STEPS: usize = 50;

/// Default gradient-ascent step size.
pub const DEFAULT_STEP_SIZE: f32 = 0.02;

/// Per-request optimizer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DreamParams {
    /// Number of gradient-ascent steps. Zero returns the (resized) input.
    pub steps: usize,
    /// Size of each step in the normalized domain.
    pub step_size: f32,
    /// Bound on the larger side of the processed image.
    pub max_dimension: u32,
}

impl Default for DreamParams {
    fn default() -> Self {
        Self { steps: DEFAULT_STEPS, step_size: DEFAULT_STEP_SIZE, max_dimension: DEFAULT_MAX_DIMENSION }
    }
}

impl DreamParams {
    /// Defaults overridden by whatever `config` sets.
    pub fn from_config(config: &DreamConfig) -> Self {
        let defaults = Self::default();
        Self {
            steps: config.steps.unwrap_or(defaults.steps),
            step_size: config.step_size.unwrap_or(defaults.step_size),
            max_dimension: config.max_dimension.unwrap_or(defaults.max_dimension),
        }
    }

    /// Checks the parameters before any work starts.
    ///
    /// # Errors
    /// Returns `DreamError::ConfigurationError` for a non-positive or non-finite
    /// step size, or a zero dimension bound.
    pub fn validate(&self) -> DreamResult<()> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(DreamError::ConfigurationError(format!(
                "step size must be a positive number, got {}",
                self.step_size
            )));
        }
        if self.max_dimension == 0 {
            return Err(DreamError::ConfigurationError(
                "maximum image dimension must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A finished dream.
#[derive(Debug, Clone)]
pub struct DreamOutcome {
    /// The dreamed image, at the processed (possibly downscaled) size.
    pub image: RgbImage,
    /// Loss of the last evaluated image.
    pub loss: f32,
    /// Canonical identifier of the model that produced the image.
    pub model_id: String,
    /// Width and height of the input before resizing.
    pub original_size: (u32, u32),
    /// Wall time spent in the pipeline.
    pub elapsed: Duration,
}

/// Runs dream requests against a shared model cache.
///
/// The service is cheap to share behind an `Arc`; concurrent requests for the
/// same model reuse a single built extractor.
pub struct DreamService<B: AutodiffBackend> {
    cache: Arc<DreamCache<B>>,
}

impl<B: AutodiffBackend> DreamService<B> {
    /// Creates a service with an empty cache backed by `provider`.
    pub fn new(provider: Arc<dyn WeightProvider<B>>, device: B::Device) -> Self {
        Self::with_cache(Arc::new(DreamCache::new(provider, device)))
    }

    /// Creates a service over an existing cache.
    pub fn with_cache(cache: Arc<DreamCache<B>>) -> Self {
        Self { cache }
    }

    /// Dreams `image` with the model named `model_id`.
    ///
    /// The model id is resolved and its cache entry built before any image
    /// work, so an unknown id fails without touching the cache and a missing
    /// model fails before the image is resized.
    ///
    /// # Errors
    /// `ConfigurationError` for invalid parameters or an unknown model,
    /// `ResourceError` if the model cannot be built, and `ComputationError` for
    /// failures while processing the image.
    pub fn generate(
        &self,
        image: &RgbImage,
        model_id: &str,
        params: &DreamParams,
    ) -> DreamResult<DreamOutcome> {
        let started = Instant::now();
        params.validate()?;
        let config = ModelRegistry::lookup(model_id)?;

        let original_size = image.dimensions();
        info!(
            model_id = %config.model_type,
            width = original_size.0,
            height = original_size.1,
            steps = params.steps,
            step_size = params.step_size,
            "Starting dream"
        );

        let dreamer = self.cache.get(config.model_type.id())?;

        let tensor = codec::preprocess::<B::InnerBackend>(image, params.max_dimension, self.cache.device())?;
        let [height, width, _] = tensor.dims();
        let (min, max) = codec::pixel_range(&tensor);
        debug!(width, height, min, max, "Preprocessed image");

        let output = dreamer.optimizer.run(tensor, params.steps, params.step_size)?;

        let (min, max) = codec::pixel_range(&output.image);
        debug!(loss = output.loss, min, max, "Optimizer output");

        let image = codec::postprocess(output.image)?;
        let elapsed = started.elapsed();
        info!(model_id = %config.model_type, loss = output.loss, elapsed = ?elapsed, "Dream complete");

        Ok(DreamOutcome {
            image,
            loss: output.loss,
            model_id: config.model_type.id().to_string(),
            original_size,
            elapsed,
        })
    }

    /// Runs [`Self::generate`] on Tokio's blocking pool.
    ///
    /// # Errors
    /// Everything [`Self::generate`] returns, plus `ComputationError` if the
    /// blocking task panics or is cancelled.
    pub async fn generate_blocking_task(
        self: Arc<Self>,
        image: RgbImage,
        model_id: String,
        params: DreamParams,
    ) -> DreamResult<DreamOutcome> {
        tokio::task::spawn_blocking(move || self.generate(&image, &model_id, &params))
            .await
            .map_err(|e| DreamError::ComputationError(format!("dream task failed: {e}")))?
    }

    /// The model catalog.
    pub fn models(&self) -> &'static [ModelConfig] {
        ModelRegistry::all()
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl DreamService<DreamBackend> {
    /// Creates a CPU service loading weights from the configured directory.
    pub fn from_config(config: &DreamConfig) -> Self {
        let weights_dir = config.resolved_weights_dir();
        info!(weights_dir = %weights_dir.display(), "Using pretrained weights directory");
        Self::new(Arc::new(FileWeightProvider::new(weights_dir)), Default::default())
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for DreamService<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DreamService").field("cache", &self.cache).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_models::MockWeightProvider;

    #[test]
    fn test_default_params() {
        let params = DreamParams::default();
        assert_eq!(params.steps, 50);
        assert!((params.step_size - 0.02).abs() < f32::EPSILON);
        assert_eq!(params.max_dimension, 512);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_from_config() {
        let config = DreamConfig { steps: Some(5), max_dimension: Some(64), ..Default::default() };

        let params = DreamParams::from_config(&config);

        assert_eq!(params.steps, 5);
        assert!((params.step_size - DEFAULT_STEP_SIZE).abs() < f32::EPSILON);
        assert_eq!(params.max_dimension, 64);
    }

    #[test]
    fn test_invalid_params() {
        let zero_step = DreamParams { step_size: 0.0, ..Default::default() };
        let nan_step = DreamParams { step_size: f32::NAN, ..Default::default() };
        let zero_bound = DreamParams { max_dimension: 0, ..Default::default() };

        for params in [zero_step, nan_step, zero_bound] {
            assert!(params.validate().unwrap_err().is_configuration());
        }
    }

    #[test]
    fn test_missing_weights_fail_on_first_use() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let provider = Arc::new(FileWeightProvider::new(temp_dir.path()));
        let service = DreamService::<DreamBackend>::new(provider, Default::default());
        let image = RgbImage::new(80, 80);
        let params = DreamParams { steps: 0, ..Default::default() };

        let err = service.generate(&image, "vgg16", &params).unwrap_err();

        assert!(err.is_resource());
        assert_eq!(service.cache_stats().total_build_failures, 1);
    }

    #[test]
    fn test_models_lists_registry() {
        let provider = Arc::new(MockWeightProvider::new()) as Arc<dyn WeightProvider<DreamBackend>>;
        let service = DreamService::new(provider, Default::default());

        let ids: Vec<_> = service.models().iter().map(|m| m.model_type.id()).collect();

        assert_eq!(ids, vec!["inception", "vgg16"]);
    }
}
