use super::{detach_unless, max_pool_3x3_s2, Network};
use candle_core::{Result, Tensor};
use candle_nn::{conv2d, linear, ops, Conv2d, Conv2dConfig, Linear, Module, VarBuilder};

pub struct AlexNet {
    convs: [Conv2d; 5],
    fc1: Linear,
    fc2: Linear,
    head: Linear,
    train_backbone: bool,
}

impl AlexNet {
    pub const HEAD: &'static str = "classifier.6";
    pub const HEAD_IN_FEATURES: usize = 4096;

    pub fn new(num_classes: usize, train_backbone: bool, vb: VarBuilder) -> Result<Self> {
        let features = vb.pp("features");
        let cfg = |padding, stride| Conv2dConfig { padding, stride, ..Default::default() };
        let convs = [
            conv2d(3, 64, 11, cfg(2, 4), features.pp("0"))?,
            conv2d(64, 192, 5, cfg(2, 1), features.pp("3"))?,
            conv2d(192, 384, 3, cfg(1, 1), features.pp("6"))?,
            conv2d(384, 256, 3, cfg(1, 1), features.pp("8"))?,
            conv2d(256, 256, 3, cfg(1, 1), features.pp("10"))?,
        ];

        let classifier = vb.pp("classifier");
        Ok(Self {
            convs,
            fc1: linear(256 * 6 * 6, 4096, classifier.pp("1"))?,
            fc2: linear(4096, 4096, classifier.pp("4"))?,
            head: linear(Self::HEAD_IN_FEATURES, num_classes, classifier.pp("6"))?,
            train_backbone,
        })
    }
}

impl Network for AlexNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let [c0, c1, c2, c3, c4] = &self.convs;
        let xs = max_pool_3x3_s2(&c0.forward(xs)?.relu()?, false)?;
        let xs = max_pool_3x3_s2(&c1.forward(&xs)?.relu()?, false)?;
        let xs = c2.forward(&xs)?.relu()?;
        let xs = c3.forward(&xs)?.relu()?;
        let xs = max_pool_3x3_s2(&c4.forward(&xs)?.relu()?, false)?;

        let dropout = |xs: Tensor| if train { ops::dropout(&xs, 0.5) } else { Ok(xs) };
        let xs = dropout(xs.flatten_from(1)?)?;
        let xs = dropout(self.fc1.forward(&xs)?.relu()?)?;
        let xs = self.fc2.forward(&xs)?.relu()?;
        self.head.forward(&detach_unless(xs, self.train_backbone))
    }
}
