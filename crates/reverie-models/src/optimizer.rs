//! Gradient-ascent dream loop.
//!
//! Each step evaluates the summed mean activation of the tapped layers,
//! differentiates it with respect to the image, normalizes the gradient by
//! its standard deviation and moves the image along it. Pixels are clipped
//! back into `[-1, 1]` after every step.

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use reverie_abstraction::{DreamError, DreamResult, FeatureExtractor};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Added to the gradient standard deviation before dividing by it.
pub const GRADIENT_EPSILON: f32 = 1e-8;

/// Result of one optimizer run.
#[derive(Debug, Clone)]
pub struct DreamOutput<B: Backend> {
    /// Loss of the last evaluated image.
    pub loss: f32,
    /// The dreamed image, `[H, W, 3]` in `[-1, 1]`.
    pub image: Tensor<B, 3>,
}

/// Gradient-ascent optimizer bound to one feature extractor.
pub struct DreamOptimizer<B: AutodiffBackend> {
    extractor: Arc<dyn FeatureExtractor<B>>,
}

impl<B: AutodiffBackend> DreamOptimizer<B> {
    /// Binds an optimizer to `extractor`.
    pub fn new(extractor: Arc<dyn FeatureExtractor<B>>) -> Self {
        Self { extractor }
    }

    /// Sum over tapped layers of each layer's mean activation for `img` (`[H, W, 3]`).
    ///
    /// # Errors
    /// Returns `DreamError::ComputationError` if the extractor fails or returns no activations.
    pub fn calc_loss(&self, img: Tensor<B, 3>) -> DreamResult<Tensor<B, 1>> {
        let batch = img.permute([2, 0, 1]).unsqueeze::<4>();

        self.extractor
            .evaluate(batch)?
            .into_iter()
            .map(|activation| activation.mean())
            .reduce(|acc, layer_mean| acc.add(layer_mean))
            .ok_or_else(|| {
                DreamError::ComputationError(format!(
                    "{} returned no activations",
                    self.extractor.model_id()
                ))
            })
    }

    /// Evaluates the loss at `img` without tracking gradients.
    ///
    /// # Errors
    /// Returns `DreamError::ComputationError` if the loss cannot be computed or is not finite.
    pub fn evaluate_loss(&self, img: &Tensor<B::InnerBackend, 3>) -> DreamResult<f32> {
        let loss = self.calc_loss(Tensor::<B, 3>::from_inner(img.clone()))?;
        finite_scalar(loss, "loss")
    }

    /// Runs `steps` gradient-ascent steps of size `step_size` starting from `img`.
    ///
    /// With `steps == 0` the loss is evaluated once and `img` is returned unchanged.
    ///
    /// # Errors
    /// Returns `DreamError::ConfigurationError` for a non-positive or non-finite
    /// `step_size`, and `DreamError::ComputationError` for a malformed image or any
    /// failure during the forward or backward pass.
    pub fn run(
        &self,
        img: Tensor<B::InnerBackend, 3>,
        steps: usize,
        step_size: f32,
    ) -> DreamResult<DreamOutput<B::InnerBackend>> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(DreamError::ConfigurationError(format!(
                "step size must be a positive number, got {step_size}"
            )));
        }

        let [height, width, channels] = img.dims();
        if channels != 3 || height == 0 || width == 0 {
            return Err(DreamError::ComputationError(format!(
                "expected an [H, W, 3] image, got [{height}, {width}, {channels}]"
            )));
        }

        let started = Instant::now();

        if steps == 0 {
            let loss = self.evaluate_loss(&img)?;
            debug!(model_id = %self.extractor.model_id(), loss, "Zero-step dream evaluated");
            return Ok(DreamOutput { loss, image: img });
        }

        let mut img = img;
        let mut loss = 0.0;

        for step in 0..steps {
            let input = Tensor::<B, 3>::from_inner(img.clone()).require_grad();
            let loss_tensor = self.calc_loss(input.clone())?;
            loss = finite_scalar(loss_tensor.clone(), "loss")?;

            let grads = loss_tensor.backward();
            let gradients = input.grad(&grads).ok_or_else(|| {
                DreamError::ComputationError("no gradient reached the input image".to_string())
            })?;
            let gradients = normalize_gradients(gradients)?;

            img = img.add(gradients.mul_scalar(step_size)).clamp(-1.0, 1.0);

            trace!(step, loss, "Dream step");
        }

        debug!(
            model_id = %self.extractor.model_id(),
            steps,
            step_size,
            height,
            width,
            loss,
            elapsed = ?started.elapsed(),
            "Dream optimization finished"
        );

        Ok(DreamOutput { loss, image: img })
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for DreamOptimizer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DreamOptimizer")
            .field("model_id", &self.extractor.model_id())
            .field("layers", &self.extractor.layers())
            .finish()
    }
}

/// Divides `gradients` by their population standard deviation plus [`GRADIENT_EPSILON`].
///
/// # Errors
/// Returns `DreamError::ComputationError` if the standard deviation is not finite.
pub fn normalize_gradients<B: Backend, const D: usize>(
    gradients: Tensor<B, D>,
) -> DreamResult<Tensor<B, D>> {
    let mean = finite_scalar(gradients.clone().mean(), "gradient mean")?;
    let variance =
        finite_scalar(gradients.clone().sub_scalar(mean).powf_scalar(2.0).mean(), "gradient variance")?;
    let std = variance.sqrt();

    Ok(gradients.div_scalar(std + GRADIENT_EPSILON))
}

fn finite_scalar<B: Backend>(value: Tensor<B, 1>, what: &str) -> DreamResult<f32> {
    let value = value.into_scalar().elem::<f32>();
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DreamError::ComputationError(format!("{what} is not finite ({value})")))
    }
}
