//! Per-architecture strategy table.
//!
//! Selected once from the validated `Architecture`: how to build the network,
//! which variables form the replaceable head and how inputs are prepared.

use crate::networks::{AlexNet, Network, ResNet50, Vgg16};
use crate::transform::{ImagePipeline, InputPolicy};
use candle_core::Result;
use candle_nn::VarBuilder;
use lumen_training::Architecture;

type BuildFn = fn(usize, bool, VarBuilder) -> Result<Box<dyn Network>>;

pub struct ArchitectureSpec {
    pub architecture: Architecture,
    /// Variable-name prefix of the classification head.
    pub head_prefix: &'static str,
    pub head_in_features: usize,
    pub input: InputPolicy,
    /// File under the pretrained directory holding the torchvision weights.
    pub pretrained_file: &'static str,
    build: BuildFn,
}

impl ArchitectureSpec {
    /// Build the network with a fresh `num_classes` head.
    pub fn build(&self, num_classes: usize, train_backbone: bool, vb: VarBuilder) -> Result<Box<dyn Network>> {
        (self.build)(num_classes, train_backbone, vb)
    }

    /// Whether the variable `name` belongs to the head.
    #[must_use]
    pub fn is_head(&self, name: &str) -> bool {
        name.strip_prefix(self.head_prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }

    #[must_use]
    pub fn pipeline(&self) -> ImagePipeline {
        ImagePipeline::new(self.input)
    }
}

const SQUARE_224: InputPolicy = InputPolicy::Resize { size: 224 };
const CROP_224: InputPolicy = InputPolicy::ResizeCenterCrop { shorter: 256, crop: 224 };

static ARCHITECTURES: [ArchitectureSpec; 3] = [
    ArchitectureSpec {
        architecture: Architecture::AlexNet,
        head_prefix: AlexNet::HEAD,
        head_in_features: AlexNet::HEAD_IN_FEATURES,
        input: SQUARE_224,
        pretrained_file: "alexnet.safetensors",
        build: |n, train_backbone, vb| Ok(Box::new(AlexNet::new(n, train_backbone, vb)?)),
    },
    ArchitectureSpec {
        architecture: Architecture::ResNet,
        head_prefix: ResNet50::HEAD,
        head_in_features: ResNet50::HEAD_IN_FEATURES,
        input: CROP_224,
        pretrained_file: "resnet.safetensors",
        build: |n, train_backbone, vb| Ok(Box::new(ResNet50::new(n, train_backbone, vb)?)),
    },
    ArchitectureSpec {
        architecture: Architecture::Vgg,
        head_prefix: Vgg16::HEAD,
        head_in_features: Vgg16::HEAD_IN_FEATURES,
        input: CROP_224,
        pretrained_file: "vgg.safetensors",
        build: |n, train_backbone, vb| Ok(Box::new(Vgg16::new(n, train_backbone, vb)?)),
    },
];

#[must_use]
pub fn spec_for(architecture: Architecture) -> &'static ArchitectureSpec {
    match architecture {
        Architecture::AlexNet => &ARCHITECTURES[0],
        Architecture::ResNet => &ARCHITECTURES[1],
        Architecture::Vgg => &ARCHITECTURES[2],
    }
}

pub fn all_specs() -> &'static [ArchitectureSpec] {
    &ARCHITECTURES
}
