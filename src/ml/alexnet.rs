// ============================================================
// Layer 5 — AlexNet, small-image variant
// ============================================================
// The ImageNet AlexNet opens with an 11x11/4 convolution that
// would erase a 32x32 image. This variant keeps the five-conv
// layout and widths but uses 3x3 kernels with stride 1:
//
//   conv 64  → pool → conv 192 → pool
//   → conv 384 → conv 256 → conv 256 → pool
//   → adaptive avg-pool 2x2 → flatten [N, 1024]
//   → Dropout → Linear → ReLU → Dropout → Linear → ReLU → Linear
//
// Three pools need at least 8 pixels of input.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::error::ConfigError;
use crate::ml::classifier::{
    kaiming_conv, normal_linear, push_conv, push_linear, ImageClassifier, NamedParams,
};

pub const MIN_IMAGE_SIZE: usize = 8;

const CONV_WIDTHS: [usize; 5] = [64, 192, 384, 256, 256];

/// A max-pool follows these convolutions
const POOL_AFTER: [usize; 3] = [0, 1, 4];

const POOLED_SIDE: usize = 2;

#[derive(Config, Debug)]
pub struct AlexNetConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    #[config(default = 512)]
    pub hidden:      usize,
    #[config(default = 0.5)]
    pub dropout:     f64,
}

impl AlexNetConfig {
    pub fn check_image_size(&self, image_size: usize) -> Result<(), ConfigError> {
        if image_size < MIN_IMAGE_SIZE {
            return Err(ConfigError::ImageTooSmall {
                model:   "alexnet".to_string(),
                size:    image_size,
                minimum: MIN_IMAGE_SIZE,
            });
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AlexNet<B> {
        let mut in_channels = self.in_channels;
        let convs = CONV_WIDTHS
            .iter()
            .map(|&width| {
                let conv = Conv2dConfig::new([in_channels, width], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device);
                in_channels = width;
                conv
            })
            .collect();

        let flat = in_channels * POOLED_SIDE * POOLED_SIDE;
        AlexNet {
            convs,
            pool:    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([POOLED_SIDE, POOLED_SIDE]).init(),
            fc1:     LinearConfig::new(flat, self.hidden).init(device),
            fc2:     LinearConfig::new(self.hidden, self.hidden).init(device),
            head:    LinearConfig::new(self.hidden, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct AlexNet<B: Backend> {
    convs:   Vec<Conv2d<B>>,
    pool:    MaxPool2d,
    avgpool: AdaptiveAvgPool2d,
    fc1:     Linear<B>,
    fc2:     Linear<B>,
    head:    Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> ImageClassifier<B> for AlexNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for (i, conv) in self.convs.iter().enumerate() {
            x = relu(conv.forward(x));
            if POOL_AFTER.contains(&i) {
                x = self.pool.forward(x);
            }
        }

        let x = self.avgpool.forward(x).flatten::<2>(1, 3);

        let x = relu(self.fc1.forward(self.dropout.forward(x)));
        let x = relu(self.fc2.forward(self.dropout.forward(x)));
        self.head.forward(x)
    }

    fn named_parameters(&self) -> NamedParams<B> {
        let mut params = Vec::new();
        for (i, conv) in self.convs.iter().enumerate() {
            push_conv(&mut params, &format!("features.{i}"), conv);
        }
        push_linear(&mut params, "classifier.fc1", &self.fc1);
        push_linear(&mut params, "classifier.fc2", &self.fc2);
        push_linear(&mut params, "classifier.head", &self.head);
        params
    }

    fn initialize_weights(mut self) -> Self {
        self.convs = self.convs.into_iter().map(kaiming_conv).collect();
        self.fc1   = normal_linear(self.fc1);
        self.fc2   = normal_linear(self.fc2);
        self.head  = normal_linear(self.head);
        self
    }
}
