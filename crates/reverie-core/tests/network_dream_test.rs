//! Dreams through randomly initialized networks loaded from Burn records.
//!
//! These run the production path end to end: records on disk, the file weight
//! provider, and backward passes through the real VGG16 and InceptionV3 trunks.

use burn::backend::NdArray;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::{Distribution, Tensor};
use image::{Rgb, RgbImage};
use reverie_abstraction::Architecture;
use reverie_core::{DreamBackend, DreamParams, DreamService};
use reverie_models::DreamCache;
use reverie_zoo::{FileWeightProvider, InceptionV3, Vgg16};
use std::sync::Arc;
use tempfile::TempDir;

type Inner = NdArray<f32>;

fn save_weights(dir: &TempDir, architecture: Architecture) -> FileWeightProvider {
    let provider = FileWeightProvider::new(dir.path());
    let path = provider.weight_path(architecture);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let device = Default::default();

    match architecture {
        Architecture::Vgg16 => Vgg16::<Inner>::new(&device).save_file(path, &recorder),
        Architecture::InceptionV3 => InceptionV3::<Inner>::new(&device).save_file(path, &recorder),
    }
    .unwrap();

    provider
}

fn cache_over(provider: FileWeightProvider) -> DreamCache<DreamBackend> {
    DreamCache::new(Arc::new(provider), Default::default())
}

fn values(tensor: Tensor<Inner, 3>) -> Vec<f32> {
    tensor.into_data().to_vec().unwrap()
}

fn assert_dreamed(before: Tensor<Inner, 3>, after: Tensor<Inner, 3>) {
    assert_eq!(before.dims(), after.dims());
    let before = values(before);
    let after = values(after);

    assert!(before.iter().zip(&after).any(|(a, b)| a != b), "no gradient reached the image");
    for v in after {
        assert!((-1.0..=1.0).contains(&v), "{v} escaped [-1, 1]");
    }
}

#[test]
fn test_vgg16_dream_through_loaded_weights() {
    let dir = TempDir::new().unwrap();
    let cache = cache_over(save_weights(&dir, Architecture::Vgg16));
    let dreamer = cache.get("vgg16").unwrap();
    let img = Tensor::<Inner, 3>::random([16, 16, 3], Distribution::Uniform(-0.9, 0.9), cache.device());

    let output = dreamer.optimizer.run(img.clone(), 2, 0.05).unwrap();

    assert!(output.loss.is_finite() && output.loss >= 0.0, "loss = {}", output.loss);
    assert_dreamed(img, output.image);
}

#[test]
fn test_inception_dream_through_loaded_weights() {
    let dir = TempDir::new().unwrap();
    let cache = cache_over(save_weights(&dir, Architecture::InceptionV3));
    let dreamer = cache.get("inception").unwrap();
    // Smallest side that still reaches mixed3 and mixed5.
    let img = Tensor::<Inner, 3>::random([43, 50, 3], Distribution::Uniform(-0.9, 0.9), cache.device());

    let output = dreamer.optimizer.run(img.clone(), 1, 0.05).unwrap();

    assert!(output.loss.is_finite() && output.loss >= 0.0, "loss = {}", output.loss);
    assert_dreamed(img, output.image);
}

#[test]
fn test_service_dreams_small_image_with_vgg16() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(save_weights(&dir, Architecture::Vgg16));
    let service = DreamService::<DreamBackend>::new(provider, Default::default());
    let image = RgbImage::from_fn(20, 12, |x, y| Rgb([(x * 12) as u8, (y * 20) as u8, 90]));
    let params = DreamParams { steps: 1, ..Default::default() };

    let outcome = service.generate(&image, "vgg16", &params).unwrap();

    assert_eq!(outcome.image.dimensions(), (20, 12));
    assert_eq!(outcome.model_id, "vgg16");
    assert!(outcome.loss.is_finite());
}
