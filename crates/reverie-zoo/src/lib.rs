//! Pretrained networks for Reverie.
//!
//! This crate is the weight provider the dream core consumes through
//! [`reverie_abstraction::WeightProvider`]. It defines the supported network
//! trunks in Burn and loads their pretrained records from disk.
//!
//! # Supported Architectures
//!
//! - **VGG16**: taps at every `blockN_convM` / `blockN_pool` output
//! - **InceptionV3**: taps at the `mixed0`..`mixed7` concatenation outputs

pub mod inception;
pub mod norm;
pub mod provider;
pub mod vgg16;

mod taps;

pub use inception::InceptionV3;
pub use norm::FrozenBatchNorm;
pub use provider::FileWeightProvider;
pub use vgg16::Vgg16;
