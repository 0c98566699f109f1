use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};

use anyhow::Result;

use crate::ml::losses::SegmentationLoss;

#[derive(Config, Debug)]
pub struct UNetConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    #[config(default = 16)]
    pub base_filters: usize,
    /// Number of 2x down-sampling stages
    #[config(default = 4)]
    pub depth: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl UNetConfig {
    /// 2^depth, or `None` when that does not fit in a `usize`.
    pub fn downsample_factor(&self) -> Option<usize> {
        u32::try_from(self.depth).ok().and_then(|d| 1usize.checked_shl(d))
    }

    /// Input side length must survive `depth` halvings without remainder.
    pub fn supports_size(&self, size: usize) -> bool {
        match self.downsample_factor() {
            Some(factor) => size > 0 && size % factor == 0,
            None         => false,
        }
    }

    fn filters(&self, level: usize) -> usize {
        self.base_filters << level
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let encoders: Vec<DoubleConv<B>> = (0..self.depth)
            .map(|level| {
                let in_ch = if level == 0 { self.in_channels } else { self.filters(level - 1) };
                self.double_conv(in_ch, self.filters(level), device)
            })
            .collect();

        let bottleneck_in = if self.depth == 0 { self.in_channels } else { self.filters(self.depth - 1) };
        let bottleneck: DoubleConv<B> = self.double_conv(bottleneck_in, self.filters(self.depth), device);

        // Deepest stage first, matching the order skips are consumed in.
        let decoders: Vec<UpStage<B>> = (0..self.depth)
            .rev()
            .map(|level| UpStage {
                up: ConvTranspose2dConfig::new([self.filters(level + 1), self.filters(level)], [2, 2])
                    .with_stride([2, 2])
                    .init(device),
                block: self.double_conv(2 * self.filters(level), self.filters(level), device),
            })
            .collect();

        let head: Conv2d<B> = Conv2dConfig::new([self.filters(0), self.num_classes], [1, 1]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        UNet { encoders, pool, bottleneck, decoders, head }
    }

    fn double_conv<B: Backend>(&self, in_ch: usize, out_ch: usize, device: &B::Device) -> DoubleConv<B> {
        let conv = |i: usize, o: usize| -> Conv2d<B> {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        DoubleConv {
            conv1:   conv(in_ch, out_ch),
            conv2:   conv(out_ch, out_ch),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// conv3x3 → ReLU → conv3x3 → ReLU → dropout
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    pub conv1:   Conv2d<B>,
    pub conv2:   Conv2d<B>,
    pub dropout: Dropout,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        let x = relu(self.conv2.forward(x));
        self.dropout.forward(x)
    }
}

/// Upsample ×2, concatenate the encoder skip, refine.
#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    pub up:    ConvTranspose2d<B>,
    pub block: DoubleConv<B>,
}

impl<B: Backend> UpStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.up.forward(x);
        self.block.forward(Tensor::cat(vec![x, skip], 1))
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub encoders:   Vec<DoubleConv<B>>,
    pub pool:       MaxPool2d,
    pub bottleneck: DoubleConv<B>,
    pub decoders:   Vec<UpStage<B>>,
    pub head:       Conv2d<B>,
}

impl<B: Backend> UNet<B> {
    /// images: [batch, in_channels, H, W] → logits: [batch, num_classes, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = images;

        for encoder in &self.encoders {
            x = encoder.forward(x);
            skips.push(x.clone());
            x = self.pool.forward(x);
        }

        x = self.bottleneck.forward(x);

        for (decoder, skip) in self.decoders.iter().zip(skips.into_iter().rev()) {
            x = decoder.forward(x, skip);
        }

        self.head.forward(x)
    }

    /// Per-pixel class probabilities (softmax over the class axis).
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        softmax(self.forward(images), 1)
    }

    /// Loss on the softmax output, plus the probabilities for metric computation.
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 4>,
        loss:    &SegmentationLoss,
    ) -> Result<(Tensor<B, 1>, Tensor<B, 4>)> {
        let probs = self.predict(images);
        Ok((loss.forward(targets, probs.clone())?, probs))
    }
}
