//! File-backed weight provider.

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use reverie_abstraction::{Architecture, DreamError, DreamResult, TappedNetwork, WeightProvider};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::inception::InceptionV3;
use crate::vgg16::Vgg16;

/// Extension of the Burn named-MessagePack records this provider reads.
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Loads pretrained networks from `<weights_dir>/<architecture id>.mpk`.
///
/// Records are full-precision Burn `NamedMpkFileRecorder` files. Parameters of
/// loaded networks do not track gradients, so backward passes only produce
/// gradients for the input image.
#[derive(Debug, Clone)]
pub struct FileWeightProvider {
    weights_dir: PathBuf,
}

impl FileWeightProvider {
    /// Creates a provider reading from `weights_dir`.
    pub fn new(weights_dir: impl Into<PathBuf>) -> Self {
        Self { weights_dir: weights_dir.into() }
    }

    /// The directory weights are read from.
    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    /// The record file expected for `architecture`.
    pub fn weight_path(&self, architecture: Architecture) -> PathBuf {
        self.weights_dir.join(format!("{}.{WEIGHTS_EXTENSION}", architecture.id()))
    }

    fn load_module<B, M>(module: M, path: &Path, device: &B::Device) -> DreamResult<M>
    where
        B: Backend,
        M: Module<B>,
    {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        module
            .load_file(path.to_path_buf(), &recorder, device)
            .map(|module| module.no_grad())
            .map_err(|e| {
                error!(path = %path.display(), error = ?e, "Failed to decode pretrained weights");
                DreamError::ResourceError(format!(
                    "failed to load pretrained weights from {}: {e:?}",
                    path.display()
                ))
            })
    }
}

impl<B: Backend> WeightProvider<B> for FileWeightProvider {
    fn load(
        &self,
        architecture: Architecture,
        device: &B::Device,
    ) -> DreamResult<Box<dyn TappedNetwork<B>>> {
        let path = self.weight_path(architecture);
        if !path.is_file() {
            return Err(DreamError::ResourceError(format!(
                "pretrained weights for {architecture} not found at {}",
                path.display()
            )));
        }

        info!(architecture = %architecture, path = %path.display(), "Loading pretrained weights");

        let network: Box<dyn TappedNetwork<B>> = match architecture {
            Architecture::InceptionV3 => {
                Box::new(Self::load_module::<B, _>(InceptionV3::new(device), &path, device)?)
            }
            Architecture::Vgg16 => {
                Box::new(Self::load_module::<B, _>(Vgg16::new(device), &path, device)?)
            }
        };

        Ok(network)
    }
}
