//! Collection of intermediate activations during a forward pass.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use reverie_abstraction::{Architecture, DreamError, DreamResult};

/// Slots for the activations a caller asked for, filled as the forward pass
/// reaches each named layer.
pub(crate) struct TapSet<'a, B: Backend> {
    architecture: Architecture,
    requested: &'a [String],
    collected: Vec<Option<Tensor<B, 4>>>,
    remaining: usize,
}

impl<'a, B: Backend> TapSet<'a, B> {
    /// Validates `requested` against the layers of `architecture`.
    pub(crate) fn new(architecture: Architecture, requested: &'a [String]) -> DreamResult<Self> {
        if requested.is_empty() {
            return Err(DreamError::ResourceError(format!(
                "no layers requested from {architecture}"
            )));
        }

        if let Some(unknown) = requested.iter().find(|name| !architecture.has_layer(name)) {
            return Err(DreamError::ResourceError(format!(
                "layer '{unknown}' does not exist in {architecture}"
            )));
        }

        Ok(Self {
            architecture,
            requested,
            collected: vec![None; requested.len()],
            remaining: requested.len(),
        })
    }

    /// Stores `activation` in every slot waiting for `layer`.
    ///
    /// Returns true once every slot is filled, at which point the forward
    /// pass can stop.
    pub(crate) fn record(&mut self, layer: &str, activation: &Tensor<B, 4>) -> bool {
        for (slot, name) in self.collected.iter_mut().zip(self.requested) {
            if slot.is_none() && name == layer {
                *slot = Some(activation.clone());
                self.remaining -= 1;
            }
        }
        self.remaining == 0
    }

    pub(crate) fn finish(self) -> DreamResult<Vec<Tensor<B, 4>>> {
        let architecture = self.architecture;
        self.collected
            .into_iter()
            .zip(self.requested)
            .map(|(slot, name)| {
                slot.ok_or_else(|| {
                    DreamError::ComputationError(format!(
                        "forward pass of {architecture} never reached layer '{name}'"
                    ))
                })
            })
            .collect()
    }
}

/// Rejects anything but a batch of 3-channel images.
pub(crate) fn check_channels<B: Backend>(
    architecture: Architecture,
    input: &Tensor<B, 4>,
) -> DreamResult<()> {
    let [_, channels, _, _] = input.dims();
    if channels != 3 {
        return Err(DreamError::ComputationError(format!(
            "{architecture} expects 3 input channels, got {channels}"
        )));
    }
    Ok(())
}

/// Fails when `x` is too small for an unpadded `window`x`window` reduction.
///
/// Only reductions the forward pass actually reaches are checked, so the
/// smallest accepted input depends on the deepest requested tap.
pub(crate) fn check_window<B: Backend>(
    architecture: Architecture,
    x: &Tensor<B, 4>,
    window: usize,
    stage: &str,
) -> DreamResult<()> {
    let [_, _, height, width] = x.dims();
    if height < window || width < window {
        return Err(DreamError::ComputationError(format!(
            "input too small for {architecture}: {width}x{height} feature map cannot fit \
             the {window}x{window} window of {stage}"
        )));
    }
    Ok(())
}
