//! Feature extractor bound to a model configuration.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use reverie_abstraction::{DreamError, DreamResult, FeatureExtractor, TappedNetwork, WeightProvider};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

use crate::registry::ModelConfig;

/// A pretrained network restricted to the layers a [`ModelConfig`] taps.
///
/// The network sits behind a mutex because Burn modules are `Send` but not
/// necessarily `Sync`; forward passes through one extractor are serialized.
pub struct TappedExtractor<B: Backend> {
    model_id: String,
    layers: Vec<String>,
    network: Mutex<Box<dyn TappedNetwork<B>>>,
}

impl<B: Backend> TappedExtractor<B> {
    /// Loads the configured architecture from `provider` and binds its tapped layers.
    ///
    /// # Errors
    /// Returns `DreamError::ResourceError` if the configuration names a layer the
    /// architecture does not have, or if the provider cannot supply the network.
    pub fn build(
        config: &ModelConfig,
        provider: &dyn WeightProvider<B>,
        device: &B::Device,
    ) -> DreamResult<Self> {
        let model_id = config.model_type.id();

        if let Some(layer) = config.layers.iter().find(|layer| !config.architecture.has_layer(layer))
        {
            error!(model_id, layer = %layer, "Configured layer missing from architecture");
            return Err(DreamError::ResourceError(format!(
                "{} has no layer named {layer}",
                config.architecture
            )));
        }

        let network = provider.load(config.architecture, device).map_err(|e| {
            error!(model_id, error = %e, "Failed to obtain pretrained network");
            match e {
                DreamError::ResourceError(_) => e,
                other => DreamError::ResourceError(other.to_string()),
            }
        })?;

        if network.architecture() != config.architecture {
            return Err(DreamError::ResourceError(format!(
                "provider returned {} for model {model_id}, expected {}",
                network.architecture(),
                config.architecture
            )));
        }

        info!(
            model_id,
            architecture = %config.architecture,
            layers = ?config.layers,
            "Feature extractor built"
        );

        Ok(Self {
            model_id: model_id.to_string(),
            layers: config.layer_names(),
            network: Mutex::new(network),
        })
    }
}

impl<B: Backend> FeatureExtractor<B> for TappedExtractor<B> {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn layers(&self) -> &[String] {
        &self.layers
    }

    fn evaluate(&self, batch: Tensor<B, 4>) -> DreamResult<Vec<Tensor<B, 4>>> {
        let activations = {
            let network = self.network.lock().unwrap_or_else(PoisonError::into_inner);
            network.forward_taps(batch, &self.layers)
        }
        .map_err(|e| match e {
            DreamError::ComputationError(_) => e,
            other => DreamError::ComputationError(other.to_string()),
        })?;

        if activations.len() != self.layers.len() {
            return Err(DreamError::ComputationError(format!(
                "{} returned {} activations for {} tapped layers",
                self.model_id,
                activations.len(),
                self.layers.len()
            )));
        }

        Ok(activations)
    }
}

impl<B: Backend> std::fmt::Debug for TappedExtractor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TappedExtractor")
            .field("model_id", &self.model_id)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
