// ============================================================
// Layer 5 — VGG (Simonyan & Zisserman, 2015)
// ============================================================
// Five stages of 3x3 convolutions, each stage closed by a 2x2
// max-pool. Depth selects how many convolutions a stage has:
//
//   vgg11: 1 1 2 2 2     vgg16: 2 2 3 3 3
//   vgg13: 2 2 2 2 2     vgg19: 2 2 4 4 4
//
// with widths 64 → 128 → 256 → 512 → 512. A `_bn` suffix puts
// BatchNorm after every convolution. Five pools halve the
// input five times, so images must be at least 32 pixels.
//
//   features → adaptive avg-pool to 1x1 → flatten [N, 512]
//   → Linear → ReLU → Dropout → Linear → ReLU → Dropout → Linear
//
// Reference: Burn Book §3 (Building Blocks)

use std::{fmt, str::FromStr};

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::ml::classifier::{
    kaiming_conv, normal_linear, push_conv, push_linear, push_norm, ImageClassifier, NamedParams,
};

pub const MIN_IMAGE_SIZE: usize = 32;

const STAGE_WIDTHS: [usize; 5] = [64, 128, 256, 512, 512];

// ─── Variant ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VggDepth {
    Vgg11,
    Vgg13,
    Vgg16,
    Vgg19,
}

impl VggDepth {
    /// Convolutions per stage
    fn stage_depths(self) -> [usize; 5] {
        match self {
            Self::Vgg11 => [1, 1, 2, 2, 2],
            Self::Vgg13 => [2, 2, 2, 2, 2],
            Self::Vgg16 => [2, 2, 3, 3, 3],
            Self::Vgg19 => [2, 2, 4, 4, 4],
        }
    }

    fn layers(self) -> usize {
        match self {
            Self::Vgg11 => 11,
            Self::Vgg13 => 13,
            Self::Vgg16 => 16,
            Self::Vgg19 => 19,
        }
    }
}

/// Parsed `--model-type`, e.g. "vgg16" or "vgg11_bn"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VggType {
    pub depth:      VggDepth,
    pub batch_norm: bool,
}

impl FromStr for VggType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (base, batch_norm) = match lower.strip_suffix("_bn") {
            Some(base) => (base, true),
            None       => (lower.as_str(), false),
        };
        let depth = match base {
            "vgg11" => VggDepth::Vgg11,
            "vgg13" => VggDepth::Vgg13,
            "vgg16" => VggDepth::Vgg16,
            "vgg19" => VggDepth::Vgg19,
            _ => {
                return Err(ConfigError::UnknownChoice {
                    kind:    "model_type",
                    value:   s.to_string(),
                    choices: "vgg11, vgg13, vgg16, vgg19 (optionally with _bn)",
                })
            }
        };
        Ok(Self { depth, batch_norm })
    }
}

impl fmt::Display for VggType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vgg{}", self.depth.layers())?;
        if self.batch_norm {
            write!(f, "_bn")?;
        }
        Ok(())
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct VggConfig {
    pub model_type:  VggType,
    pub in_channels: usize,
    pub num_classes: usize,
    #[config(default = 512)]
    pub hidden:      usize,
    #[config(default = 0.5)]
    pub dropout:     f64,
}

impl VggConfig {
    pub fn check_image_size(&self, image_size: usize) -> Result<(), ConfigError> {
        if image_size < MIN_IMAGE_SIZE {
            return Err(ConfigError::ImageTooSmall {
                model:   self.model_type.to_string(),
                size:    image_size,
                minimum: MIN_IMAGE_SIZE,
            });
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg<B> {
        let mut in_channels = self.in_channels;
        let stages = self.model_type.depth.stage_depths()
            .iter()
            .zip(STAGE_WIDTHS)
            .map(|(&depth, width)| {
                let blocks = (0..depth)
                    .map(|_| {
                        let block = self.conv_block(in_channels, width, device);
                        in_channels = width;
                        block
                    })
                    .collect();
                VggStage { blocks }
            })
            .collect();

        Vgg {
            stages,
            pool:    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1:     LinearConfig::new(in_channels, self.hidden).init(device),
            fc2:     LinearConfig::new(self.hidden, self.hidden).init(device),
            head:    LinearConfig::new(self.hidden, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }

    fn conv_block<B: Backend>(&self, input: usize, output: usize, device: &B::Device) -> ConvBlock<B> {
        let conv = Conv2dConfig::new([input, output], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm = self.model_type.batch_norm
            .then(|| BatchNormConfig::new(output).init(device));
        ConvBlock { conv, norm }
    }
}

// ─── Modules ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None       => x,
        };
        relu(x)
    }
}

#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
}

#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    stages:  Vec<VggStage<B>>,
    pool:    MaxPool2d,
    avgpool: AdaptiveAvgPool2d,
    fc1:     Linear<B>,
    fc2:     Linear<B>,
    head:    Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> ImageClassifier<B> for Vgg<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for stage in &self.stages {
            for block in &stage.blocks {
                x = block.forward(x);
            }
            x = self.pool.forward(x);
        }

        // [N, 512, 1, 1] → [N, 512]
        let x = self.avgpool.forward(x).flatten::<2>(1, 3);

        let x = self.dropout.forward(relu(self.fc1.forward(x)));
        let x = self.dropout.forward(relu(self.fc2.forward(x)));
        self.head.forward(x)
    }

    fn named_parameters(&self) -> NamedParams<B> {
        let mut params = Vec::new();
        for (s, stage) in self.stages.iter().enumerate() {
            for (b, block) in stage.blocks.iter().enumerate() {
                push_conv(&mut params, &format!("features.{s}.{b}.conv"), &block.conv);
                if let Some(norm) = &block.norm {
                    push_norm(&mut params, &format!("features.{s}.{b}.norm"), norm);
                }
            }
        }
        push_linear(&mut params, "classifier.fc1", &self.fc1);
        push_linear(&mut params, "classifier.fc2", &self.fc2);
        push_linear(&mut params, "classifier.head", &self.head);
        params
    }

    fn initialize_weights(mut self) -> Self {
        self.stages = self.stages
            .into_iter()
            .map(|stage| VggStage {
                blocks: stage.blocks
                    .into_iter()
                    .map(|block| ConvBlock { conv: kaiming_conv(block.conv), norm: block.norm })
                    .collect(),
            })
            .collect();
        self.fc1  = normal_linear(self.fc1);
        self.fc2  = normal_linear(self.fc2);
        self.head = normal_linear(self.head);
        self
    }
}
