//! Inception v3 trunk up to `mixed7`.
//!
//! Mirrors the Keras application layout: every convolution is bias-free and
//! followed by a scale-free batch normalization and a ReLU. The trunk stops
//! at `mixed7`; the deeper `mixed8`..`mixed10` blocks are not needed by any
//! registered dream configuration.

use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::{avg_pool2d, max_pool2d};
use reverie_abstraction::{Architecture, DreamResult, TappedNetwork};

use crate::norm::FrozenBatchNorm;
use crate::taps::{TapSet, check_channels, check_window};

/// Unpadded window of each stem convolution; 1 for same-padded or 1x1 ones.
const STEM_WINDOWS: [usize; 5] = [3, 3, 1, 1, 3];

/// Window of the stride-2 max pools and of the `mixed3` reduction.
const REDUCE_WINDOW: usize = 3;

/// Convolution + frozen batch norm + ReLU.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    norm: FrozenBatchNorm<B>,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        channels: [usize; 2],
        kernel: [usize; 2],
        stride: usize,
        padding: PaddingConfig2d,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new(channels, kernel)
            .with_stride([stride, stride])
            .with_padding(padding)
            .with_bias(false)
            .init(device);

        Self { conv, norm: FrozenBatchNorm::new(channels[1], device) }
    }

    fn same(channels: [usize; 2], kernel: [usize; 2], device: &B::Device) -> Self {
        Self::new(channels, kernel, 1, PaddingConfig2d::Same, device)
    }

    fn valid(channels: [usize; 2], kernel: [usize; 2], stride: usize, device: &B::Device) -> Self {
        Self::new(channels, kernel, stride, PaddingConfig2d::Valid, device)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.norm.forward(self.conv.forward(x)))
    }
}

/// 3x3 stride-1 average pool that ignores the padded border, as TensorFlow does.
fn avg_pool_same<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    avg_pool2d(x, [3, 3], [1, 1], [1, 1], false)
}

/// 3x3 stride-2 max pool without padding.
fn max_pool_reduce<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    max_pool2d(x, [3, 3], [2, 2], [0, 0], [1, 1])
}

/// `mixed0`..`mixed2`: 1x1, 5x5, double 3x3 and pooled branches.
#[derive(Module, Debug)]
pub struct InceptionA<B: Backend> {
    branch1x1: ConvBn<B>,
    branch5x5_1: ConvBn<B>,
    branch5x5_2: ConvBn<B>,
    branch3x3dbl_1: ConvBn<B>,
    branch3x3dbl_2: ConvBn<B>,
    branch3x3dbl_3: ConvBn<B>,
    branch_pool: ConvBn<B>,
}

impl<B: Backend> InceptionA<B> {
    fn new(in_ch: usize, pool_features: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: ConvBn::same([in_ch, 64], [1, 1], device),
            branch5x5_1: ConvBn::same([in_ch, 48], [1, 1], device),
            branch5x5_2: ConvBn::same([48, 64], [5, 5], device),
            branch3x3dbl_1: ConvBn::same([in_ch, 64], [1, 1], device),
            branch3x3dbl_2: ConvBn::same([64, 96], [3, 3], device),
            branch3x3dbl_3: ConvBn::same([96, 96], [3, 3], device),
            branch_pool: ConvBn::same([in_ch, pool_features], [1, 1], device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let branch1x1 = self.branch1x1.forward(x.clone());

        let branch5x5 = self.branch5x5_2.forward(self.branch5x5_1.forward(x.clone()));

        let branch3x3dbl = self.branch3x3dbl_1.forward(x.clone());
        let branch3x3dbl = self.branch3x3dbl_2.forward(branch3x3dbl);
        let branch3x3dbl = self.branch3x3dbl_3.forward(branch3x3dbl);

        let branch_pool = self.branch_pool.forward(avg_pool_same(x));

        Tensor::cat(vec![branch1x1, branch5x5, branch3x3dbl, branch_pool], 1)
    }
}

/// `mixed3`: grid reduction from 35x35 to 17x17 (at the canonical input size).
#[derive(Module, Debug)]
pub struct ReductionA<B: Backend> {
    branch3x3: ConvBn<B>,
    branch3x3dbl_1: ConvBn<B>,
    branch3x3dbl_2: ConvBn<B>,
    branch3x3dbl_3: ConvBn<B>,
}

impl<B: Backend> ReductionA<B> {
    fn new(in_ch: usize, device: &B::Device) -> Self {
        Self {
            branch3x3: ConvBn::valid([in_ch, 384], [3, 3], 2, device),
            branch3x3dbl_1: ConvBn::same([in_ch, 64], [1, 1], device),
            branch3x3dbl_2: ConvBn::same([64, 96], [3, 3], device),
            branch3x3dbl_3: ConvBn::valid([96, 96], [3, 3], 2, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let branch3x3 = self.branch3x3.forward(x.clone());

        let branch3x3dbl = self.branch3x3dbl_1.forward(x.clone());
        let branch3x3dbl = self.branch3x3dbl_2.forward(branch3x3dbl);
        let branch3x3dbl = self.branch3x3dbl_3.forward(branch3x3dbl);

        let branch_pool = max_pool_reduce(x);

        Tensor::cat(vec![branch3x3, branch3x3dbl, branch_pool], 1)
    }
}

/// `mixed4`..`mixed7`: factorized 7x7 branches.
#[derive(Module, Debug)]
pub struct InceptionC<B: Backend> {
    branch1x1: ConvBn<B>,
    branch7x7_1: ConvBn<B>,
    branch7x7_2: ConvBn<B>,
    branch7x7_3: ConvBn<B>,
    branch7x7dbl_1: ConvBn<B>,
    branch7x7dbl_2: ConvBn<B>,
    branch7x7dbl_3: ConvBn<B>,
    branch7x7dbl_4: ConvBn<B>,
    branch7x7dbl_5: ConvBn<B>,
    branch_pool: ConvBn<B>,
}

impl<B: Backend> InceptionC<B> {
    fn new(in_ch: usize, c7: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: ConvBn::same([in_ch, 192], [1, 1], device),
            branch7x7_1: ConvBn::same([in_ch, c7], [1, 1], device),
            branch7x7_2: ConvBn::same([c7, c7], [1, 7], device),
            branch7x7_3: ConvBn::same([c7, 192], [7, 1], device),
            branch7x7dbl_1: ConvBn::same([in_ch, c7], [1, 1], device),
            branch7x7dbl_2: ConvBn::same([c7, c7], [7, 1], device),
            branch7x7dbl_3: ConvBn::same([c7, c7], [1, 7], device),
            branch7x7dbl_4: ConvBn::same([c7, c7], [7, 1], device),
            branch7x7dbl_5: ConvBn::same([c7, 192], [1, 7], device),
            branch_pool: ConvBn::same([in_ch, 192], [1, 1], device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let branch1x1 = self.branch1x1.forward(x.clone());

        let branch7x7 = self.branch7x7_1.forward(x.clone());
        let branch7x7 = self.branch7x7_2.forward(branch7x7);
        let branch7x7 = self.branch7x7_3.forward(branch7x7);

        let branch7x7dbl = self.branch7x7dbl_1.forward(x.clone());
        let branch7x7dbl = self.branch7x7dbl_2.forward(branch7x7dbl);
        let branch7x7dbl = self.branch7x7dbl_3.forward(branch7x7dbl);
        let branch7x7dbl = self.branch7x7dbl_4.forward(branch7x7dbl);
        let branch7x7dbl = self.branch7x7dbl_5.forward(branch7x7dbl);

        let branch_pool = self.branch_pool.forward(avg_pool_same(x));

        Tensor::cat(vec![branch1x1, branch7x7, branch7x7dbl, branch_pool], 1)
    }
}

/// Inception v3 without the `mixed8`+ blocks and classifier head.
///
/// Output channels: mixed0 = 256, mixed1/mixed2 = 288, mixed3..mixed7 = 768.
#[derive(Module, Debug)]
pub struct InceptionV3<B: Backend> {
    stem: Vec<ConvBn<B>>,
    inception_a: Vec<InceptionA<B>>,
    reduction_a: ReductionA<B>,
    inception_c: Vec<InceptionC<B>>,
}

impl<B: Backend> InceptionV3<B> {
    /// Create a randomly initialized trunk.
    pub fn new(device: &B::Device) -> Self {
        let stem = vec![
            ConvBn::valid([3, 32], [3, 3], 2, device),
            ConvBn::valid([32, 32], [3, 3], 1, device),
            ConvBn::same([32, 64], [3, 3], device),
            ConvBn::valid([64, 80], [1, 1], 1, device),
            ConvBn::valid([80, 192], [3, 3], 1, device),
        ];

        let inception_a = vec![
            InceptionA::new(192, 32, device),
            InceptionA::new(256, 64, device),
            InceptionA::new(288, 64, device),
        ];

        let inception_c = [128, 160, 160, 192]
            .into_iter()
            .map(|c7| InceptionC::new(768, c7, device))
            .collect();

        Self {
            stem,
            inception_a,
            reduction_a: ReductionA::new(288, device),
            inception_c,
        }
    }

    fn forward_stem(&self, x: Tensor<B, 4>) -> DreamResult<Tensor<B, 4>> {
        let mut x = x;
        for (i, (layer, window)) in self.stem.iter().zip(STEM_WINDOWS).enumerate() {
            check_window(Architecture::InceptionV3, &x, window, "the stem")?;
            x = layer.forward(x);
            // Pools follow the third and fifth convolutions.
            if i == 2 || i == 4 {
                check_window(Architecture::InceptionV3, &x, REDUCE_WINDOW, "the stem")?;
                x = max_pool_reduce(x);
            }
        }
        Ok(x)
    }
}

impl<B: Backend> TappedNetwork<B> for InceptionV3<B> {
    fn architecture(&self) -> Architecture {
        Architecture::InceptionV3
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &[String]) -> DreamResult<Vec<Tensor<B, 4>>> {
        let mut taps = TapSet::new(Architecture::InceptionV3, taps)?;
        check_channels(Architecture::InceptionV3, &input)?;

        let mut x = self.forward_stem(input)?;
        let mut index = 0;

        for block in &self.inception_a {
            x = block.forward(x);
            if taps.record(&format!("mixed{index}"), &x) {
                return taps.finish();
            }
            index += 1;
        }

        let reduction = format!("mixed{index}");
        check_window(Architecture::InceptionV3, &x, REDUCE_WINDOW, &reduction)?;
        x = self.reduction_a.forward(x);
        if taps.record(&reduction, &x) {
            return taps.finish();
        }
        index += 1;

        for block in &self.inception_c {
            x = block.forward(x);
            if taps.record(&format!("mixed{index}"), &x) {
                return taps.finish();
            }
            index += 1;
        }

        taps.finish()
    }
}
