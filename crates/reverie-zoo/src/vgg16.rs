//! VGG16 convolutional trunk.

use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::tensor::Tensor;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::module::max_pool2d;
use reverie_abstraction::{Architecture, DreamResult, TappedNetwork};

use crate::taps::{TapSet, check_channels, check_window};

/// Output channels and convolution count of each block.
const BLOCKS: [(usize, usize); 5] = [(64, 2), (128, 2), (256, 3), (512, 3), (512, 3)];

/// One VGG block: 3x3 same-padded convolutions followed by a 2x2 max pool.
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
}

/// VGG16 without its classifier head.
///
/// Layer names follow the Keras convention (`block3_conv3`, `block4_pool`, ...).
///
/// Output channels per block: [64, 128, 256, 512, 512]
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    blocks: Vec<VggBlock<B>>,
}

impl<B: Backend> Vgg16<B> {
    /// Create a randomly initialized VGG16 trunk.
    pub fn new(device: &B::Device) -> Self {
        let conv_config = |in_ch, out_ch| {
            Conv2dConfig::new([in_ch, out_ch], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(true)
        };

        let mut in_ch = 3;
        let blocks = BLOCKS
            .iter()
            .map(|&(out_ch, depth)| {
                let convs = (0..depth)
                    .map(|i| {
                        let from = if i == 0 { in_ch } else { out_ch };
                        conv_config(from, out_ch).init(device)
                    })
                    .collect();
                in_ch = out_ch;
                VggBlock { convs }
            })
            .collect();

        Self { blocks }
    }
}

impl<B: Backend> TappedNetwork<B> for Vgg16<B> {
    fn architecture(&self) -> Architecture {
        Architecture::Vgg16
    }

    fn forward_taps(&self, input: Tensor<B, 4>, taps: &[String]) -> DreamResult<Vec<Tensor<B, 4>>> {
        let mut taps = TapSet::new(Architecture::Vgg16, taps)?;
        check_channels(Architecture::Vgg16, &input)?;

        let mut x = input;
        for (b, block) in self.blocks.iter().enumerate() {
            for (c, conv) in block.convs.iter().enumerate() {
                x = relu(conv.forward(x));
                if taps.record(&format!("block{}_conv{}", b + 1, c + 1), &x) {
                    return taps.finish();
                }
            }

            let pool = format!("block{}_pool", b + 1);
            check_window(Architecture::Vgg16, &x, 2, &pool)?;
            x = max_pool2d(x, [2, 2], [2, 2], [0, 0], [1, 1]);
            if taps.record(&pool, &x) {
                return taps.finish();
            }
        }

        taps.finish()
    }
}
