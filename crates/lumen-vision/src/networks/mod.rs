//! Candle implementations of the pretrained backbones.
//!
//! Variable names follow the torchvision state dicts so pretrained weights
//! exported from there load by name.

mod alexnet;
mod resnet;
mod vgg;

pub use alexnet::AlexNet;
pub use resnet::ResNet50;
pub use vgg::{vgg16_feature_layers, Vgg16, VggLayer};

use candle_core::{Result, Tensor};

/// A classification network: images `[n, 3, h, w]` to logits `[n, classes]`.
pub trait Network: Send {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor>;
}

/// `max_pool2d` with a 3×3 window, stride 2 and optional one-pixel zero padding.
///
/// Zero padding matches `-inf` padding here because every input follows a ReLU.
pub(crate) fn max_pool_3x3_s2(xs: &Tensor, pad: bool) -> Result<Tensor> {
    let xs = if pad { xs.pad_with_zeros(2, 1, 1)?.pad_with_zeros(3, 1, 1)? } else { xs.clone() };
    xs.max_pool2d_with_stride(3, 2)
}

/// Cut the gradient path into the backbone when only the head is trained.
pub(crate) fn detach_unless(xs: Tensor, train_backbone: bool) -> Tensor {
    if train_backbone { xs } else { xs.detach() }
}
