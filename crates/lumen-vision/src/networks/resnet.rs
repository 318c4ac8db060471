use super::{detach_unless, max_pool_3x3_s2, Network};
use candle_core::{Result, Tensor};
use candle_nn::{
    batch_norm, conv2d_no_bias, linear, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear, Module, ModuleT,
    VarBuilder,
};

const EXPANSION: usize = 4;
const LAYERS: [(usize, usize, usize); 4] = [(64, 3, 1), (128, 4, 2), (256, 6, 2), (512, 3, 2)];

fn conv_bn(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    conv_vb: VarBuilder,
    bn_vb: VarBuilder,
) -> Result<(Conv2d, BatchNorm)> {
    let cfg = Conv2dConfig { padding: kernel / 2, stride, ..Default::default() };
    let conv = conv2d_no_bias(in_channels, out_channels, kernel, cfg, conv_vb)?;
    let bn = batch_norm(out_channels, BatchNormConfig::default(), bn_vb)?;
    Ok((conv, bn))
}

struct Bottleneck {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    conv3: Conv2d,
    bn3: BatchNorm,
    downsample: Option<(Conv2d, BatchNorm)>,
}

impl Bottleneck {
    fn new(in_channels: usize, planes: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let out_channels = planes * EXPANSION;
        let (conv1, bn1) = conv_bn(in_channels, planes, 1, 1, vb.pp("conv1"), vb.pp("bn1"))?;
        let (conv2, bn2) = conv_bn(planes, planes, 3, stride, vb.pp("conv2"), vb.pp("bn2"))?;
        let (conv3, bn3) = conv_bn(planes, out_channels, 1, 1, vb.pp("conv3"), vb.pp("bn3"))?;
        let downsample = if stride != 1 || in_channels != out_channels {
            let ds = vb.pp("downsample");
            Some(conv_bn(in_channels, out_channels, 1, stride, ds.pp("0"), ds.pp("1"))?)
        } else {
            None
        };
        Ok(Self { conv1, bn1, conv2, bn2, conv3, bn3, downsample })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let ys = self.bn1.forward_t(&self.conv1.forward(xs)?, train)?.relu()?;
        let ys = self.bn2.forward_t(&self.conv2.forward(&ys)?, train)?.relu()?;
        let ys = self.bn3.forward_t(&self.conv3.forward(&ys)?, train)?;
        let shortcut = match &self.downsample {
            Some((conv, bn)) => bn.forward_t(&conv.forward(xs)?, train)?,
            None => xs.clone(),
        };
        (ys + shortcut)?.relu()
    }
}

pub struct ResNet50 {
    conv1: Conv2d,
    bn1: BatchNorm,
    layers: Vec<Bottleneck>,
    head: Linear,
    train_backbone: bool,
}

impl ResNet50 {
    pub const HEAD: &'static str = "fc";
    pub const HEAD_IN_FEATURES: usize = 512 * EXPANSION;

    pub fn new(num_classes: usize, train_backbone: bool, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig { padding: 3, stride: 2, ..Default::default() };
        let conv1 = conv2d_no_bias(3, 64, 7, cfg, vb.pp("conv1"))?;
        let bn1 = batch_norm(64, BatchNormConfig::default(), vb.pp("bn1"))?;

        let mut layers = Vec::with_capacity(16);
        let mut in_channels = 64;
        for (i, (planes, blocks, stride)) in LAYERS.into_iter().enumerate() {
            let layer_vb = vb.pp(format!("layer{}", i + 1));
            for block in 0..blocks {
                let block_stride = if block == 0 { stride } else { 1 };
                layers.push(Bottleneck::new(in_channels, planes, block_stride, layer_vb.pp(block.to_string()))?);
                in_channels = planes * EXPANSION;
            }
        }

        let head = linear(Self::HEAD_IN_FEATURES, num_classes, vb.pp("fc"))?;
        Ok(Self { conv1, bn1, layers, head, train_backbone })
    }
}

impl Network for ResNet50 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        // Frozen batch norm keeps using the pretrained running statistics.
        let bn_train = train && self.train_backbone;
        let xs = self.bn1.forward_t(&self.conv1.forward(xs)?, bn_train)?.relu()?;
        let mut xs = max_pool_3x3_s2(&xs, true)?;
        for block in &self.layers {
            xs = block.forward_t(&xs, bn_train)?;
        }
        let xs = xs.mean(3)?.mean(2)?;
        self.head.forward(&detach_unless(xs, self.train_backbone))
    }
}
