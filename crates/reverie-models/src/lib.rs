//! Dream models for Reverie.
//!
//! This crate holds everything between a model identifier and a dreamed
//! tensor:
//!
//! - [`ModelRegistry`]: the static catalog of dream models.
//! - [`TappedExtractor`]: a pretrained network bound to a model's tapped layers.
//! - [`DreamOptimizer`]: the gradient-ascent loop.
//! - [`DreamCache`]: builds each model's extractor and optimizer at most once.
//!
//! # Supported Models
//!
//! - **inception**: InceptionV3, tapped at `mixed3` and `mixed5`
//! - **vgg16**: VGG16, tapped at `block3_conv3` and `block4_conv3`

pub mod cache;
pub mod extractor;
pub mod optimizer;
pub mod registry;

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use reverie_abstraction::{Architecture, DreamError, DreamResult, TappedNetwork, WeightProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub use cache::{CacheStats, CachedDreamer, DreamCache};
pub use extractor::TappedExtractor;
pub use optimizer::{DreamOptimizer, DreamOutput, GRADIENT_EPSILON, normalize_gradients};
pub use registry::{DEFAULT_MODEL, ModelConfig, ModelRegistry, ModelType};

/// A weight provider that hands out [`MockNetwork`]s, for testing and development.
///
/// Loads are counted so tests can assert how often the cache built a model.
#[derive(Debug)]
pub struct MockWeightProvider {
    loads: AtomicUsize,
    failures_remaining: AtomicUsize,
    load_delay: Option<Duration>,
    activation_scale: f32,
}

impl Default for MockWeightProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWeightProvider {
    /// Creates a provider whose loads always succeed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            load_delay: None,
            activation_scale: 1.0,
        }
    }

    /// Creates a provider whose next `failures` loads fail with `ResourceError`.
    #[must_use]
    pub const fn failing(failures: usize) -> Self {
        Self { failures_remaining: AtomicUsize::new(failures), ..Self::new() }
    }

    /// Makes every load sleep for `delay` before returning.
    #[must_use]
    pub const fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Multiplies every activation of the handed-out networks by `scale`.
    #[must_use]
    pub const fn with_activation_scale(mut self, scale: f32) -> Self {
        self.activation_scale = scale;
        self
    }

    /// Number of loads attempted so far, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl<B: Backend> WeightProvider<B> for MockWeightProvider {
    fn load(
        &self,
        architecture: Architecture,
        _device: &B::Device,
    ) -> DreamResult<Box<dyn TappedNetwork<B>>> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(architecture = %architecture, attempt, "MockWeightProvider loading network");

        if let Some(delay) = self.load_delay {
            thread::sleep(delay);
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DreamError::ResourceError(format!(
                "mock weights for {architecture} unavailable"
            )));
        }

        Ok(Box::new(MockNetwork { architecture, scale: self.activation_scale }))
    }
}

/// A deterministic stand-in for a pretrained network.
///
/// Every tap returns `scale * depth * x^2`, where `depth` is the tap's
/// 1-based position in the architecture's layer list, so deeper taps respond
/// more strongly and the loss is differentiable everywhere.
#[derive(Debug, Clone, Copy)]
pub struct MockNetwork {
    architecture: Architecture,
    scale: f32,
}

impl MockNetwork {
    /// Creates a mock network for `architecture` with unit scale.
    #[must_use]
    pub const fn new(architecture: Architecture) -> Self {
        Self { architecture, scale: 1.0 }
    }
}

impl<B: Backend> TappedNetwork<B> for MockNetwork {
    fn architecture(&self) -> Architecture {
        self.architecture
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &[String]) -> DreamResult<Vec<Tensor<B, 4>>> {
        let [_, channels, _, _] = input.dims();
        if channels != 3 {
            return Err(DreamError::ComputationError(format!(
                "expected 3 input channels, got {channels}"
            )));
        }

        let layers = self.architecture.layer_names();
        taps.iter()
            .map(|tap| {
                let depth = layers.iter().position(|layer| layer == tap).ok_or_else(|| {
                    DreamError::ResourceError(format!(
                        "{} has no layer named {tap}",
                        self.architecture
                    ))
                })?;
                let factor = self.scale * (depth + 1) as f32;
                Ok(input.clone().mul(input.clone()).mul_scalar(factor))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn load(provider: &MockWeightProvider) -> DreamResult<Box<dyn TappedNetwork<TestBackend>>> {
        WeightProvider::<TestBackend>::load(provider, Architecture::Vgg16, &Default::default())
    }

    #[test]
    fn test_mock_provider_counts_loads() {
        let provider = MockWeightProvider::new();
        assert_eq!(provider.load_count(), 0);

        let network = load(&provider).unwrap();
        assert_eq!(network.architecture(), Architecture::Vgg16);
        assert_eq!(provider.load_count(), 1);
    }

    #[test]
    fn test_mock_provider_fails_requested_loads() {
        let provider = MockWeightProvider::failing(2);

        assert!(matches!(load(&provider), Err(DreamError::ResourceError(_))));
        assert!(matches!(load(&provider), Err(DreamError::ResourceError(_))));
        assert!(load(&provider).is_ok());
        assert_eq!(provider.load_count(), 3);
    }

    #[test]
    fn test_mock_network_activations() {
        let device = Default::default();
        let network = MockNetwork::new(Architecture::Vgg16);
        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.5f32, -1.0, 2.0], [1, 3, 1, 1]),
            &device,
        );
        // block1_conv2 is the second VGG layer.
        let taps = vec!["block1_conv2".to_string()];

        let out = TappedNetwork::<TestBackend>::forward_taps(&network, input, &taps).unwrap();

        let values: Vec<f32> = out[0].clone().into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.5, 2.0, 8.0]);
    }

    #[test]
    fn test_mock_network_rejects_foreign_layer() {
        let network = MockNetwork::new(Architecture::InceptionV3);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 2, 2], &Default::default());

        let result = TappedNetwork::<TestBackend>::forward_taps(
            &network,
            input,
            &["block3_conv3".to_string()],
        );

        assert!(matches!(result, Err(DreamError::ResourceError(_))));
    }
}
