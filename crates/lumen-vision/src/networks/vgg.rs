use super::{detach_unless, Network};
use candle_core::{Result, Tensor};
use candle_nn::{conv2d, linear, ops, Conv2d, Conv2dConfig, Linear, Module, VarBuilder};

const VGG16_CFG: [Option<usize>; 18] = [
    Some(64),
    Some(64),
    None,
    Some(128),
    Some(128),
    None,
    Some(256),
    Some(256),
    Some(256),
    None,
    Some(512),
    Some(512),
    Some(512),
    None,
    Some(512),
    Some(512),
    Some(512),
    None,
];

/// One stage of the VGG feature extractor, with its `features.N` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VggLayer {
    Conv { index: usize, in_channels: usize, out_channels: usize },
    Pool { index: usize },
}

/// VGG-16 feature layers with their torchvision indices. Each conv is
/// followed by an unnamed ReLU that still takes an index.
pub fn vgg16_feature_layers() -> Vec<VggLayer> {
    let mut layers = Vec::with_capacity(VGG16_CFG.len());
    let mut index = 0;
    let mut in_channels = 3;
    for entry in VGG16_CFG {
        match entry {
            Some(out_channels) => {
                layers.push(VggLayer::Conv { index, in_channels, out_channels });
                in_channels = out_channels;
                index += 2;
            }
            None => {
                layers.push(VggLayer::Pool { index });
                index += 1;
            }
        }
    }
    layers
}

enum Stage {
    Conv(Conv2d),
    Pool,
}

pub struct Vgg16 {
    features: Vec<Stage>,
    fc1: Linear,
    fc2: Linear,
    head: Linear,
    train_backbone: bool,
}

impl Vgg16 {
    pub const HEAD: &'static str = "classifier.6";
    pub const HEAD_IN_FEATURES: usize = 4096;

    pub fn new(num_classes: usize, train_backbone: bool, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig { padding: 1, ..Default::default() };
        let fvb = vb.pp("features");
        let features = vgg16_feature_layers()
            .into_iter()
            .map(|layer| match layer {
                VggLayer::Conv { index, in_channels, out_channels } => {
                    conv2d(in_channels, out_channels, 3, cfg, fvb.pp(index.to_string())).map(Stage::Conv)
                }
                VggLayer::Pool { .. } => Ok(Stage::Pool),
            })
            .collect::<Result<Vec<_>>>()?;

        let classifier = vb.pp("classifier");
        Ok(Self {
            features,
            fc1: linear(512 * 7 * 7, 4096, classifier.pp("0"))?,
            fc2: linear(4096, 4096, classifier.pp("3"))?,
            head: linear(Self::HEAD_IN_FEATURES, num_classes, classifier.pp("6"))?,
            train_backbone,
        })
    }
}

impl Network for Vgg16 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut xs = xs.clone();
        for stage in &self.features {
            xs = match stage {
                Stage::Conv(conv) => conv.forward(&xs)?.relu()?,
                Stage::Pool => xs.max_pool2d(2)?,
            };
        }

        let dropout = |xs: Tensor| if train { ops::dropout(&xs, 0.5) } else { Ok(xs) };
        let xs = xs.flatten_from(1)?;
        let xs = dropout(self.fc1.forward(&xs)?.relu()?)?;
        let xs = dropout(self.fc2.forward(&xs)?.relu()?)?;
        self.head.forward(&detach_unless(xs, self.train_backbone))
    }
}
