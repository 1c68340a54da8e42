//! Integration tests for the dream optimizer.

use burn::backend::{Autodiff, NdArray};
use burn::tensor::{Distribution, Tensor, TensorData};
use reverie_abstraction::{DreamError, DreamResult, FeatureExtractor, WeightProvider};
use reverie_models::{DreamCache, DreamOptimizer, MockWeightProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type TestBackend = Autodiff<NdArray<f32>>;
type Inner = NdArray<f32>;

fn optimizer_with(provider: MockWeightProvider, model_id: &str) -> Arc<DreamOptimizer<TestBackend>> {
    let provider = Arc::new(provider) as Arc<dyn WeightProvider<TestBackend>>;
    let cache = DreamCache::<TestBackend>::new(provider, Default::default());
    cache.get(model_id).unwrap().optimizer
}

fn random_image(height: usize, width: usize) -> Tensor<Inner, 3> {
    Tensor::random([height, width, 3], Distribution::Uniform(-0.9, 0.9), &Default::default())
}

fn values(tensor: Tensor<Inner, 3>) -> Vec<f32> {
    tensor.into_data().to_vec().unwrap()
}

#[test]
fn test_zero_steps_is_identity() {
    let optimizer = optimizer_with(MockWeightProvider::new(), "inception");
    let img = random_image(6, 5);

    let output = optimizer.run(img.clone(), 0, 0.02).unwrap();

    assert_eq!(output.image.dims(), [6, 5, 3]);
    assert_eq!(values(output.image), values(img.clone()));
    let direct = optimizer.evaluate_loss(&img).unwrap();
    assert!((output.loss - direct).abs() < 1e-6);
}

#[test]
fn test_clip_invariant() {
    let optimizer = optimizer_with(MockWeightProvider::new(), "vgg16");
    let img = Tensor::<Inner, 3>::from_data(
        TensorData::new(
            vec![0.99f32, -0.99, 0.5, -0.5, 1.0, -1.0, 0.0, 0.9, -0.9, 0.7, -0.7, 0.2],
            [2, 2, 3],
        ),
        &Default::default(),
    );

    for steps in [0, 1, 5] {
        let output = optimizer.run(img.clone(), steps, 0.5).unwrap();
        assert_eq!(output.image.dims(), [2, 2, 3]);
        for v in values(output.image) {
            assert!((-1.0..=1.0).contains(&v), "{v} escaped [-1, 1] after {steps} steps");
        }
    }
}

#[test]
fn test_gradient_scale_invariance() {
    let weak = optimizer_with(MockWeightProvider::new(), "vgg16");
    let strong = optimizer_with(MockWeightProvider::new().with_activation_scale(1000.0), "vgg16");
    let img = random_image(4, 4);

    let weak_out = weak.run(img.clone(), 3, 0.02).unwrap();
    let strong_out = strong.run(img.clone(), 3, 0.02).unwrap();

    assert!(strong_out.loss > weak_out.loss * 100.0);
    for (a, b) in values(weak_out.image).iter().zip(values(strong_out.image)) {
        assert!((a - b).abs() < 1e-4, "updates diverged: {a} vs {b}");
    }
}

#[test]
fn test_ascent_increases_loss() {
    let optimizer = optimizer_with(MockWeightProvider::new(), "inception");
    let img = random_image(5, 5);
    let before = optimizer.evaluate_loss(&img).unwrap();

    let output = optimizer.run(img, 10, 0.02).unwrap();
    let after = optimizer.evaluate_loss(&output.image).unwrap();

    assert!(after > before, "loss did not increase: {before} -> {after}");
}

#[test]
fn test_run_is_deterministic() {
    let optimizer = optimizer_with(MockWeightProvider::new(), "vgg16");
    let img = random_image(3, 4);

    let first = optimizer.run(img.clone(), 4, 0.05).unwrap();
    let second = optimizer.run(img, 4, 0.05).unwrap();

    assert_eq!(values(first.image), values(second.image));
    assert!((first.loss - second.loss).abs() < f32::EPSILON);
}

#[test]
fn test_non_finite_loss_stops_the_loop() {
    for scale in [f32::NAN, f32::INFINITY] {
        let optimizer = optimizer_with(MockWeightProvider::new().with_activation_scale(scale), "vgg16");

        let result = optimizer.run(random_image(3, 3), 2, 0.02);

        assert!(matches!(result, Err(DreamError::ComputationError(_))), "scale {scale}");
    }
}

/// Squares its input like the mock network, but fails from the `fail_at`-th evaluation on.
struct FlakyExtractor {
    layers: Vec<String>,
    calls: AtomicUsize,
    fail_at: usize,
}

impl FeatureExtractor<TestBackend> for FlakyExtractor {
    fn model_id(&self) -> &str {
        "flaky"
    }

    fn layers(&self) -> &[String] {
        &self.layers
    }

    fn evaluate(&self, batch: Tensor<TestBackend, 4>) -> DreamResult<Vec<Tensor<TestBackend, 4>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_at {
            return Err(DreamError::ComputationError(format!("evaluation {call} failed")));
        }
        Ok(vec![batch.clone().mul(batch)])
    }
}

#[test]
fn test_extractor_failure_mid_run_propagates() {
    let extractor = Arc::new(FlakyExtractor {
        layers: vec!["block3_conv3".to_string()],
        calls: AtomicUsize::new(0),
        fail_at: 3,
    });
    let optimizer = DreamOptimizer::new(Arc::clone(&extractor) as Arc<dyn FeatureExtractor<TestBackend>>);

    let result = optimizer.run(random_image(4, 4), 10, 0.02);

    match result {
        Err(DreamError::ComputationError(msg)) => assert!(msg.contains("evaluation 3")),
        other => panic!("expected a computation error, got {other:?}"),
    }
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
}
