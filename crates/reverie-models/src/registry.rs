//! Model registry mapping dream model identifiers to network configurations.
//!
//! The catalog is fixed at compile time. Adding a model means adding a
//! [`ModelType`] variant and a [`ModelConfig`] entry, nothing else.

use reverie_abstraction::{Architecture, DreamError, DreamResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::error;

/// Identifier used when the caller does not pick a model.
pub const DEFAULT_MODEL: &str = "inception";

/// Model type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// InceptionV3 tapped at `mixed3` and `mixed5`.
    Inception,
    /// VGG16 tapped at `block3_conv3` and `block4_conv3`.
    Vgg16,
}

impl ModelType {
    /// The canonical registry identifier.
    pub fn id(self) -> &'static str {
        match self {
            Self::Inception => "inception",
            Self::Vgg16 => "vgg16",
        }
    }
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inception" | "inceptionv3" | "inception_v3" => Ok(Self::Inception),
            "vgg16" | "vgg" => Ok(Self::Vgg16),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Model configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    /// The registry key.
    pub model_type: ModelType,
    /// Human-readable network name (e.g., "InceptionV3").
    pub name: &'static str,
    /// The network family the extractor is built from.
    pub architecture: Architecture,
    /// Layers whose activations are maximized, in output order.
    pub layers: &'static [&'static str],
    /// Short description of the visual style.
    pub description: &'static str,
}

impl ModelConfig {
    /// Tapped layers as owned strings, the form extractors take.
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|layer| (*layer).to_string()).collect()
    }
}

static MODEL_CONFIGS: [ModelConfig; 2] = [
    ModelConfig {
        model_type: ModelType::Inception,
        name: "InceptionV3",
        architecture: Architecture::InceptionV3,
        layers: &["mixed3", "mixed5"],
        description: "Creates complex, abstract dream patterns with intricate details",
    },
    ModelConfig {
        model_type: ModelType::Vgg16,
        name: "VGG16",
        architecture: Architecture::Vgg16,
        layers: &["block3_conv3", "block4_conv3"],
        description: "Generates geometric, structured patterns with clear textures",
    },
];

/// Static catalog of dream models.
pub struct ModelRegistry;

impl ModelRegistry {
    /// Resolves a model identifier (case-insensitive, aliases accepted).
    ///
    /// # Errors
    /// Returns `DreamError::ConfigurationError` if `model_id` is not registered.
    pub fn lookup(model_id: &str) -> DreamResult<&'static ModelConfig> {
        let model_type = ModelType::from_str(model_id).map_err(|()| {
            error!(model_id = %model_id, "Unrecognized model type");
            DreamError::ConfigurationError(format!(
                "Unknown model type: {model_id} (available: {})",
                Self::ids().join(", ")
            ))
        })?;

        Ok(Self::get(model_type))
    }

    /// Returns the configuration for a known model type.
    pub fn get(model_type: ModelType) -> &'static ModelConfig {
        match model_type {
            ModelType::Inception => &MODEL_CONFIGS[0],
            ModelType::Vgg16 => &MODEL_CONFIGS[1],
        }
    }

    /// All registered configurations.
    pub fn all() -> &'static [ModelConfig] {
        &MODEL_CONFIGS
    }

    /// Canonical identifiers of all registered models.
    pub fn ids() -> Vec<&'static str> {
        MODEL_CONFIGS.iter().map(|config| config.model_type.id()).collect()
    }
}
