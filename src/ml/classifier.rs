// ============================================================
// Layer 5 — Image Classifier Abstraction
// ============================================================
// The trainer is generic over this trait, so VGG and AlexNet
// share one fit/test loop. Besides the forward pass a model
// exposes its parameters by name (for watch statistics) and
// an explicit weight-initialization step:
//
//   conv weights    → Kaiming normal, fan-out, ReLU gain
//   linear weights  → N(0, 0.01)
//   every bias      → 0
//   batch-norm      → gamma 1, beta 0 (Burn's defaults)

use burn::{
    module::Param,
    nn::{conv::Conv2d, BatchNorm, Linear},
    prelude::*,
    tensor::Distribution,
};

/// A parameter tensor of any rank a CNN uses
#[derive(Debug, Clone)]
pub enum ParamTensor<B: Backend> {
    Vector(Param<Tensor<B, 1>>),
    Matrix(Param<Tensor<B, 2>>),
    Kernel(Param<Tensor<B, 4>>),
}

impl<B: Backend> ParamTensor<B> {
    #[cfg(test)]
    pub fn num_params(&self) -> usize {
        match self {
            Self::Vector(p) => p.val().shape().num_elements(),
            Self::Matrix(p) => p.val().shape().num_elements(),
            Self::Kernel(p) => p.val().shape().num_elements(),
        }
    }
}

pub type NamedParams<B> = Vec<(String, ParamTensor<B>)>;

pub trait ImageClassifier<B: Backend>: Module<B> {
    /// images [N, C, H, W] → logits [N, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Every trainable parameter with a dotted path name
    fn named_parameters(&self) -> NamedParams<B>;

    /// Re-draw all weights with the initialization scheme above
    fn initialize_weights(self) -> Self;
}

// ─── Initialization helpers ───────────────────────────────────────────────────
fn zeroed<B: Backend>(bias: Option<Param<Tensor<B, 1>>>) -> Option<Param<Tensor<B, 1>>> {
    bias.map(|b| {
        let value = b.val();
        Param::initialized(b.id, Tensor::zeros(value.shape(), &value.device()).require_grad())
    })
}

/// Kaiming normal with fan_out = out_channels * kh * kw, gain sqrt(2)
pub fn kaiming_conv<B: Backend>(mut conv: Conv2d<B>) -> Conv2d<B> {
    let weight = conv.weight.val();
    let [out_channels, _, kh, kw] = weight.dims();
    let std = (2.0 / (out_channels * kh * kw) as f64).sqrt();

    let drawn = Tensor::random(weight.shape(), Distribution::Normal(0.0, std), &weight.device());
    conv.weight = Param::initialized(conv.weight.id, drawn.require_grad());
    conv.bias   = zeroed(conv.bias);
    conv
}

/// N(0, 0.01) weights, zero bias
pub fn normal_linear<B: Backend>(mut linear: Linear<B>) -> Linear<B> {
    let weight = linear.weight.val();
    let drawn  = Tensor::random(weight.shape(), Distribution::Normal(0.0, 0.01), &weight.device());
    linear.weight = Param::initialized(linear.weight.id, drawn.require_grad());
    linear.bias   = zeroed(linear.bias);
    linear
}

// ─── Naming helpers ───────────────────────────────────────────────────────────
pub fn push_conv<B: Backend>(out: &mut NamedParams<B>, prefix: &str, conv: &Conv2d<B>) {
    out.push((format!("{prefix}.weight"), ParamTensor::Kernel(conv.weight.clone())));
    if let Some(bias) = &conv.bias {
        out.push((format!("{prefix}.bias"), ParamTensor::Vector(bias.clone())));
    }
}

pub fn push_linear<B: Backend>(out: &mut NamedParams<B>, prefix: &str, linear: &Linear<B>) {
    out.push((format!("{prefix}.weight"), ParamTensor::Matrix(linear.weight.clone())));
    if let Some(bias) = &linear.bias {
        out.push((format!("{prefix}.bias"), ParamTensor::Vector(bias.clone())));
    }
}

pub fn push_norm<B: Backend>(out: &mut NamedParams<B>, prefix: &str, norm: &BatchNorm<B, 2>) {
    out.push((format!("{prefix}.gamma"), ParamTensor::Vector(norm.gamma.clone())));
    out.push((format!("{prefix}.beta"),  ParamTensor::Vector(norm.beta.clone())));
}
