//! Inference-only batch normalization.

use burn::module::{Module, Param};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Epsilon used by the pretrained Inception batch-norm layers.
pub const BATCH_NORM_EPSILON: f64 = 1e-3;

/// Batch normalization frozen to its running statistics, without a learned scale.
///
/// Burn's `BatchNorm` switches to batch statistics whenever the backend has
/// autodiff enabled, which would change the network's activations while the
/// dream optimizer differentiates through it. This layer always normalizes
/// with the stored running mean and variance.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    /// Learned shift.
    pub beta: Param<Tensor<B, 1>>,
    /// Running mean.
    pub running_mean: Param<Tensor<B, 1>>,
    /// Running variance.
    pub running_var: Param<Tensor<B, 1>>,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Creates an identity normalization over `channels` channels.
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            beta: Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var: Param::from_tensor(Tensor::ones([channels], device)),
        }
    }

    /// Normalizes `[batch, channels, height, width]` input per channel.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.beta.val().dims();
        let shape = [1, channels, 1, 1];

        let mean = self.running_mean.val().reshape(shape);
        let std = self.running_var.val().add_scalar(BATCH_NORM_EPSILON).sqrt().reshape(shape);
        let beta = self.beta.val().reshape(shape);

        x.sub(mean).div(std).add(beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity_init_preserves_input() {
        let device = Default::default();
        let norm = FrozenBatchNorm::<TestBackend>::new(2, &device);
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, -2.0, 3.0, 4.0], [1, 2, 1, 2]),
            &device,
        );

        let out: Vec<f32> = norm.forward(x).into_data().to_vec().unwrap();
        let scale = (1.0 + BATCH_NORM_EPSILON as f32).sqrt();
        let expected = [1.0 / scale, -2.0 / scale, 3.0 / scale, 4.0 / scale];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_uses_running_statistics() {
        let device = Default::default();
        let mut norm = FrozenBatchNorm::<TestBackend>::new(1, &device);
        norm.running_mean = Param::from_tensor(Tensor::from_data(TensorData::new(vec![2.0f32], [1]), &device));
        norm.running_var = Param::from_tensor(Tensor::from_data(TensorData::new(vec![4.0f32], [1]), &device));
        norm.beta = Param::from_tensor(Tensor::from_data(TensorData::new(vec![0.5f32], [1]), &device));

        let x = Tensor::<TestBackend, 4>::from_data(TensorData::new(vec![6.0f32], [1, 1, 1, 1]), &device);
        let out: Vec<f32> = norm.forward(x).into_data().to_vec().unwrap();

        let expected = (6.0 - 2.0) / (4.0 + BATCH_NORM_EPSILON as f32).sqrt() + 0.5;
        assert!((out[0] - expected).abs() < 1e-6);
    }
}
