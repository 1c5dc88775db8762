// ============================================================
// Layer 4 — Image Transform Pipeline
// ============================================================
// An ordered list of image operations applied to every sample
// before batching:
//
//   evaluation: Resize → ToTensor → Normalize
//   training:   Resize → RandomHorizontalFlip → RandomVerticalFlip
//               → ToTensor → Normalize
//
// Both paths share the same resize and normalization constants;
// only the two flips differ. Building a pipeline is pure, the
// randomness comes from the Rng handed to `apply`.
//
// Reference: image crate (DynamicImage::resize_exact, fliph, flipv)

use image::{imageops::FilterType, DynamicImage};
use rand::Rng;

use crate::domain::error::ConfigError;

/// Per-channel mean of the 3-channel reference data, on a 0–255 scale
pub const RGB_MEAN_255: [f32; 3] = [125.3, 123.0, 113.9];
/// Per-channel standard deviation of the 3-channel reference data, 0–255 scale
pub const RGB_STD_255:  [f32; 3] = [63.0, 62.1, 66.7];
/// Grayscale mean on a 0–255 scale
pub const GRAY_MEAN_255: [f32; 1] = [33.3];
/// Grayscale standard deviation on a 0–255 scale
pub const GRAY_STD_255:  [f32; 1] = [78.6];

// ─── ImageTensor ──────────────────────────────────────────────────────────────
/// A CHW float image, the output of `ToTensor`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// [channels, height, width]
    pub shape: [usize; 3],
    /// Row-major CHW values
    pub data:  Vec<f32>,
}

impl ImageTensor {
    /// Convert an 8-bit image into CHW floats in [0, 1].
    /// One- and two-channel images become grayscale, everything else RGB.
    pub fn from_image(image: &DynamicImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;

        if image.color().channel_count() <= 2 {
            let gray = image.to_luma8();
            let data = gray.as_raw().iter().map(|&p| p as f32 / 255.0).collect();
            return Self { shape: [1, height, width], data };
        }

        // image stores HWC; the tensor wants CHW
        let rgb = image.to_rgb8();
        let mut data = vec![0.0f32; 3 * plane];
        for (i, px) in rgb.as_raw().chunks_exact(3).enumerate() {
            data[i]             = px[0] as f32 / 255.0;
            data[plane + i]     = px[1] as f32 / 255.0;
            data[2 * plane + i] = px[2] as f32 / 255.0;
        }
        Self { shape: [3, height, width], data }
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    fn normalize(mut self, mean: &[f32], std: &[f32]) -> Self {
        let plane = self.shape[1] * self.shape[2];
        for (c, channel) in self.data.chunks_mut(plane.max(1)).enumerate() {
            let m = mean[c % mean.len()];
            let s = std[c % std.len()];
            for v in channel.iter_mut() {
                *v = (*v - m) / s;
            }
        }
        self
    }
}

// ─── TransformOp ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    Resize { height: u32, width: u32 },
    RandomHorizontalFlip { p: f64 },
    RandomVerticalFlip { p: f64 },
    ToTensor,
    Normalize { mean: Vec<f32>, std: Vec<f32> },
}

impl TransformOp {
    pub fn is_random(&self) -> bool {
        matches!(
            self,
            TransformOp::RandomHorizontalFlip { .. } | TransformOp::RandomVerticalFlip { .. }
        )
    }
}

impl std::fmt::Display for TransformOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformOp::Resize { height, width }   => write!(f, "Resize({height}, {width})"),
            TransformOp::RandomHorizontalFlip { p } => write!(f, "RandomHorizontalFlip(p={p})"),
            TransformOp::RandomVerticalFlip { p }   => write!(f, "RandomVerticalFlip(p={p})"),
            TransformOp::ToTensor                   => write!(f, "ToTensor"),
            TransformOp::Normalize { mean, std }    => write!(f, "Normalize(mean={mean:?}, std={std:?})"),
        }
    }
}

// Intermediate value while walking the op list
enum Working {
    Image(DynamicImage),
    Tensor(ImageTensor),
}

impl Working {
    fn into_tensor(self) -> ImageTensor {
        match self {
            Working::Image(img) => ImageTensor::from_image(&img),
            Working::Tensor(t)  => t,
        }
    }
}

// ─── Compose ──────────────────────────────────────────────────────────────────
/// An ordered transform pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Compose {
    ops: Vec<TransformOp>,
}

impl Compose {
    pub fn new(ops: Vec<TransformOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// True when at least one op draws from the Rng
    pub fn is_random(&self) -> bool {
        self.ops.iter().any(TransformOp::is_random)
    }

    /// Run every op in order. Pixel ops that appear after `ToTensor`
    /// are ignored; a pipeline without `ToTensor` is converted at the end.
    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> ImageTensor {
        let mut current = Working::Image(image.clone());

        for op in &self.ops {
            current = match (op, current) {
                (TransformOp::Resize { height, width }, Working::Image(img)) => {
                    if img.width() == *width && img.height() == *height {
                        Working::Image(img)
                    } else {
                        Working::Image(img.resize_exact(*width, *height, FilterType::Triangle))
                    }
                }
                (TransformOp::RandomHorizontalFlip { p }, Working::Image(img)) => {
                    if rng.gen_bool(*p) { Working::Image(img.fliph()) } else { Working::Image(img) }
                }
                (TransformOp::RandomVerticalFlip { p }, Working::Image(img)) => {
                    if rng.gen_bool(*p) { Working::Image(img.flipv()) } else { Working::Image(img) }
                }
                (TransformOp::ToTensor, working) => Working::Tensor(working.into_tensor()),
                (TransformOp::Normalize { mean, std }, working) => {
                    Working::Tensor(working.into_tensor().normalize(mean, std))
                }
                (_, tensor @ Working::Tensor(_)) => tensor,
            };
        }

        current.into_tensor()
    }
}

// ─── BaseTransforms ───────────────────────────────────────────────────────────
/// The "BASE" pipeline family selected by `--transforms base`.
pub struct BaseTransforms;

impl BaseTransforms {
    /// Build the train or evaluation pipeline for `[channels, size, size]`.
    pub fn build(image_shape: [usize; 3], train: bool) -> Result<Compose, ConfigError> {
        let [channels, height, width] = image_shape;
        let (mean, std) = normalization_constants(channels)?;

        let mut ops = vec![TransformOp::Resize { height: height as u32, width: width as u32 }];
        if train {
            ops.push(TransformOp::RandomHorizontalFlip { p: 0.5 });
            ops.push(TransformOp::RandomVerticalFlip { p: 0.5 });
        }
        ops.push(TransformOp::ToTensor);
        ops.push(TransformOp::Normalize { mean, std });

        Ok(Compose::new(ops))
    }
}

/// Mean/std in [0, 1] scale for the given channel count
pub fn normalization_constants(channels: usize) -> Result<(Vec<f32>, Vec<f32>), ConfigError> {
    let (mean, std): (&[f32], &[f32]) = match channels {
        1 => (&GRAY_MEAN_255, &GRAY_STD_255),
        3 => (&RGB_MEAN_255, &RGB_STD_255),
        other => return Err(ConfigError::UnsupportedChannels(other)),
    };
    Ok((
        mean.iter().map(|x| x / 255.0).collect(),
        std.iter().map(|x| x / 255.0).collect(),
    ))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::{rngs::StdRng, SeedableRng};

    // 2x2 image with four distinct colours so every flip is distinguishable
    fn quad() -> DynamicImage {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        img.put_pixel(1, 0, Rgb([40, 50, 60]));
        img.put_pixel(0, 1, Rgb([70, 80, 90]));
        img.put_pixel(1, 1, Rgb([100, 110, 120]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_eval_pipeline_order() {
        let eval = BaseTransforms::build([3, 32, 32], false).unwrap();
        let names: Vec<String> = eval.ops().iter().map(|op| op.to_string()).collect();
        assert_eq!(names[0], "Resize(32, 32)");
        assert_eq!(names[1], "ToTensor");
        assert!(names[2].starts_with("Normalize"));
        assert!(!eval.is_random());
    }

    #[test]
    fn test_train_pipeline_adds_flips_before_to_tensor() {
        let train = BaseTransforms::build([3, 32, 32], true).unwrap();
        let ops = train.ops();
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[1], TransformOp::RandomHorizontalFlip { p: 0.5 });
        assert_eq!(ops[2], TransformOp::RandomVerticalFlip { p: 0.5 });
        assert_eq!(ops[3], TransformOp::ToTensor);
        assert!(train.is_random());
    }

    #[test]
    fn test_train_and_eval_share_normalization() {
        let train = BaseTransforms::build([3, 32, 32], true).unwrap();
        let eval  = BaseTransforms::build([3, 32, 32], false).unwrap();
        assert_eq!(train.ops().last(), eval.ops().last());
        assert_eq!(train.ops().first(), eval.ops().first());
    }

    #[test]
    fn test_constants_are_scaled() {
        let (mean, std) = normalization_constants(3).unwrap();
        assert!((mean[0] - 125.3 / 255.0).abs() < 1e-6);
        assert!((std[2] - 66.7 / 255.0).abs() < 1e-6);
        assert!(normalization_constants(4).is_err());
    }

    #[test]
    fn test_eval_pipeline_is_idempotent() {
        let eval = BaseTransforms::build([3, 2, 2], false).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let a = eval.apply(&quad(), &mut rng);
        let b = eval.apply(&quad(), &mut rng);
        assert_eq!(a.shape, [3, 2, 2]);
        for (x, y) in a.data.iter().zip(b.data.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_to_tensor_is_chw() {
        let t = ImageTensor::from_image(&quad());
        assert_eq!(t.shape, [3, 2, 2]);
        // red plane first, then green
        assert!((t.data[0] - 10.0 / 255.0).abs() < 1e-6);
        assert!((t.data[1] - 40.0 / 255.0).abs() < 1e-6);
        assert!((t.data[4] - 20.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_resize_changes_spatial_size() {
        let eval = BaseTransforms::build([3, 8, 8], false).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let t = eval.apply(&quad(), &mut rng);
        assert_eq!(t.shape, [3, 8, 8]);
        assert_eq!(t.data.len(), 3 * 64);
    }

    #[test]
    fn test_flips_are_independent_and_fair() {
        let eval  = BaseTransforms::build([3, 2, 2], false).unwrap();
        let train = BaseTransforms::build([3, 2, 2], true).unwrap();
        let mut rng = StdRng::seed_from_u64(9423);

        let plain = eval.apply(&quad(), &mut rng);
        let h     = eval.apply(&quad().fliph(), &mut rng);
        let v     = eval.apply(&quad().flipv(), &mut rng);
        let hv    = eval.apply(&quad().fliph().flipv(), &mut rng);

        let trials = 4000;
        let (mut h_count, mut v_count, mut both) = (0usize, 0usize, 0usize);
        for _ in 0..trials {
            let out = train.apply(&quad(), &mut rng);
            if out == h {
                h_count += 1;
            } else if out == v {
                v_count += 1;
            } else if out == hv {
                h_count += 1;
                v_count += 1;
                both += 1;
            } else {
                assert_eq!(out, plain);
            }
        }

        let h_rate    = h_count as f64 / trials as f64;
        let v_rate    = v_count as f64 / trials as f64;
        let both_rate = both as f64 / trials as f64;
        assert!((h_rate - 0.5).abs() < 0.05, "horizontal rate {h_rate}");
        assert!((v_rate - 0.5).abs() < 0.05, "vertical rate {v_rate}");
        assert!((both_rate - 0.25).abs() < 0.05, "joint rate {both_rate}");
    }

    #[test]
    fn test_grayscale_pipeline() {
        let eval = BaseTransforms::build([1, 4, 4], false).unwrap();
        let img  = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([255])));
        let out  = eval.apply(&img, &mut StdRng::seed_from_u64(0));
        assert_eq!(out.shape, [1, 4, 4]);
        let expected = (1.0 - 33.3 / 255.0) / (78.6 / 255.0);
        assert!((out.data[0] - expected).abs() < 1e-4);
    }
}
