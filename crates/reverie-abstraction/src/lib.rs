//! Abstraction layer for Reverie.
//!
//! This crate defines the error taxonomy and the seams between the dream
//! optimizer and the pretrained networks it drives:
//!
//! - [`Architecture`]: the closed set of supported network families.
//! - [`TappedNetwork`]: a loaded network that can report intermediate activations.
//! - [`WeightProvider`]: the collaborator that hands out pretrained networks.
//! - [`FeatureExtractor`]: a network bound to the layers a model configuration taps.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for dream operations.
pub type DreamResult<T> = std::result::Result<T, DreamError>;

/// Represents an error that can occur while producing a dream image.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DreamError {
    /// The caller asked for something that is not configured (e.g. an unregistered model id).
    #[error("Configuration Error: {0}")]
    ConfigurationError(String),

    /// Pretrained weights could not be obtained or the network could not be built from them.
    #[error("Resource Error: {0}")]
    ResourceError(String),

    /// A failure during preprocessing, the forward/backward pass, or postprocessing.
    #[error("Computation Error: {0}")]
    ComputationError(String),
}

impl DreamError {
    /// Returns true for [`DreamError::ConfigurationError`].
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }

    /// Returns true for [`DreamError::ResourceError`].
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::ResourceError(_))
    }

    /// Returns true for [`DreamError::ComputationError`].
    pub fn is_computation(&self) -> bool {
        matches!(self, Self::ComputationError(_))
    }
}

const VGG16_LAYERS: &[&str] = &[
    "block1_conv1",
    "block1_conv2",
    "block1_pool",
    "block2_conv1",
    "block2_conv2",
    "block2_pool",
    "block3_conv1",
    "block3_conv2",
    "block3_conv3",
    "block3_pool",
    "block4_conv1",
    "block4_conv2",
    "block4_conv3",
    "block4_pool",
    "block5_conv1",
    "block5_conv2",
    "block5_conv3",
    "block5_pool",
];

const INCEPTION_V3_LAYERS: &[&str] = &[
    "mixed0", "mixed1", "mixed2", "mixed3", "mixed4", "mixed5", "mixed6", "mixed7",
];

/// Supported network architectures.
///
/// Adding an architecture means adding a variant here plus a network in the
/// weight provider; the optimizer never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Inception v3, tapped at its `mixedN` concatenation outputs.
    InceptionV3,
    /// VGG16, tapped at its convolution and pooling outputs.
    Vgg16,
}

impl Architecture {
    /// Stable identifier, also used as the weight file stem.
    pub fn id(self) -> &'static str {
        match self {
            Self::InceptionV3 => "inception_v3",
            Self::Vgg16 => "vgg16",
        }
    }

    /// Names of the layers whose activations can be tapped, in forward order.
    pub fn layer_names(self) -> &'static [&'static str] {
        match self {
            Self::InceptionV3 => INCEPTION_V3_LAYERS,
            Self::Vgg16 => VGG16_LAYERS,
        }
    }

    /// Returns true if `layer` can be tapped on this architecture.
    pub fn has_layer(self, layer: &str) -> bool {
        self.layer_names().contains(&layer)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A pretrained network that exposes intermediate activations.
///
/// Implementations must run a plain forward pass so that an autodiff backend
/// can differentiate the returned activations with respect to `input`.
pub trait TappedNetwork<B: Backend>: Send {
    /// The architecture this network implements.
    fn architecture(&self) -> Architecture;

    /// Runs `input` (`[batch, 3, height, width]`) forward and returns one
    /// activation per entry of `taps`, in the same order.
    ///
    /// # Errors
    /// Returns `DreamError::ResourceError` if a tap name is not a layer of this network.
    fn forward_taps(&self, input: Tensor<B, 4>, taps: &[String]) -> DreamResult<Vec<Tensor<B, 4>>>;
}

/// Supplies pretrained networks.
pub trait WeightProvider<B: Backend>: Send + Sync {
    /// Loads the pretrained network for `architecture` onto `device`.
    ///
    /// # Errors
    /// Returns `DreamError::ResourceError` if the weights cannot be obtained or decoded.
    fn load(
        &self,
        architecture: Architecture,
        device: &B::Device,
    ) -> DreamResult<Box<dyn TappedNetwork<B>>>;
}

/// A network restricted to the layers a model configuration taps.
///
/// All extractors must be `Send + Sync` so a single instance can serve
/// concurrent requests.
pub trait FeatureExtractor<B: Backend>: Send + Sync {
    /// The registry identifier this extractor was built for.
    fn model_id(&self) -> &str;

    /// The tapped layers, in output order.
    fn layers(&self) -> &[String];

    /// Returns the activations of the tapped layers for `batch`, one tensor per layer.
    ///
    /// # Errors
    /// Returns `DreamError::ComputationError` if the forward pass fails.
    fn evaluate(&self, batch: Tensor<B, 4>) -> DreamResult<Vec<Tensor<B, 4>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_helpers() {
        assert!(DreamError::ConfigurationError("x".to_string()).is_configuration());
        assert!(DreamError::ResourceError("x".to_string()).is_resource());
        assert!(DreamError::ComputationError("x".to_string()).is_computation());
        assert!(!DreamError::ResourceError("x".to_string()).is_computation());
    }

    #[test]
    fn test_error_display() {
        let err = DreamError::ConfigurationError("Unknown model type: resnet".to_string());
        assert_eq!(err.to_string(), "Configuration Error: Unknown model type: resnet");
    }

    #[test]
    fn test_error_serializes() {
        let err = DreamError::ResourceError("weights missing".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: DreamError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn test_architecture_layers() {
        assert!(Architecture::InceptionV3.has_layer("mixed3"));
        assert!(Architecture::InceptionV3.has_layer("mixed5"));
        assert!(!Architecture::InceptionV3.has_layer("block3_conv3"));
        assert!(Architecture::Vgg16.has_layer("block4_conv3"));
        assert!(!Architecture::Vgg16.has_layer("mixed3"));
    }

    #[test]
    fn test_architecture_ids() {
        assert_eq!(Architecture::InceptionV3.to_string(), "inception_v3");
        assert_eq!(Architecture::Vgg16.id(), "vgg16");
    }
}
