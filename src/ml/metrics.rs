// ============================================================
// Layer 5 — Classification Metrics
// ============================================================
// Epoch metrics are means weighted by batch size, so a short
// last batch counts for exactly as many samples as it holds:
//
//   loss = Σ loss_b * n_b / Σ n_b
//   acc  = Σ correct_b   / Σ n_b
//
// TensorStats summarizes one parameter or gradient tensor for
// the tracker's watch stream.

use std::collections::BTreeMap;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Metric name → value, e.g. "val/acc" → 0.53
pub type MetricMap = BTreeMap<String, f64>;

/// Number of rows whose argmax equals the target
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1], flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted.equal(targets).int().sum().into_scalar().elem::<i64>() as usize
}

// ─── Accumulator ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct ClassificationAccumulator {
    loss_sum: f64,
    correct:  usize,
    seen:     usize,
}

impl ClassificationAccumulator {
    pub fn update(&mut self, batch_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += batch_loss * batch_size as f64;
        self.correct  += correct;
        self.seen     += batch_size;
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    /// NaN when nothing was seen
    pub fn loss(&self) -> f64 {
        if self.seen == 0 {
            return f64::NAN;
        }
        self.loss_sum / self.seen as f64
    }

    pub fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            return 0.0;
        }
        self.correct as f64 / self.seen as f64
    }

    /// `{prefix}/loss` and `{prefix}/acc`
    pub fn metrics(&self, prefix: &str) -> MetricMap {
        let mut out = MetricMap::new();
        out.insert(format!("{prefix}/loss"), self.loss());
        out.insert(format!("{prefix}/acc"), self.accuracy());
        out
    }
}

// ─── Tensor statistics ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorStats {
    pub mean: f64,
    pub std:  f64,
    pub min:  f64,
    pub max:  f64,
    pub norm: f64,
}

impl TensorStats {
    pub fn from_values(values: impl IntoIterator<Item = f32>) -> Option<Self> {
        let mut n      = 0usize;
        let mut sum    = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut min    = f64::INFINITY;
        let mut max    = f64::NEG_INFINITY;

        for v in values {
            let v = v as f64;
            n      += 1;
            sum    += v;
            sum_sq += v * v;
            min     = min.min(v);
            max     = max.max(v);
        }
        if n == 0 {
            return None;
        }

        let mean = sum / n as f64;
        let var  = (sum_sq / n as f64 - mean * mean).max(0.0);
        Some(Self { mean, std: var.sqrt(), min, max, norm: sum_sq.sqrt() })
    }

    pub fn of<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Option<Self> {
        Self::from_values(tensor.into_data().iter::<f32>())
    }
}

/// Watch record for one named parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamStats {
    pub name:  String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TensorStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grad:  Option<TensorStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_weighted_by_batch_size() {
        let mut acc = ClassificationAccumulator::default();
        acc.update(1.0, 64, 64);
        acc.update(4.0, 0, 16);

        // (64 * 1.0 + 16 * 4.0) / 80
        assert!((acc.loss() - 1.6).abs() < 1e-12);
        assert!((acc.accuracy() - 0.8).abs() < 1e-12);
        assert_eq!(acc.seen(), 80);

        let m = acc.metrics("val");
        assert!(m.contains_key("val/loss"));
        assert!(m.contains_key("val/acc"));
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = ClassificationAccumulator::default();
        assert!(acc.loss().is_nan());
        assert_eq!(acc.accuracy(), 0.0);
    }

    #[test]
    fn test_correct_predictions() {
        let device  = Default::default();
        let logits  = Tensor::<TestBackend, 2>::from_floats(
            [[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, 1, 1], &device);
        assert_eq!(correct_predictions(logits, targets), 2);
    }

    #[test]
    fn test_tensor_stats() {
        let stats = TensorStats::from_values([1.0f32, -1.0, 3.0, -3.0]).unwrap();
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.min, -3.0);
        assert_eq!(stats.max, 3.0);
        assert!((stats.std - 5.0f64.sqrt()).abs() < 1e-9);
        assert!((stats.norm - 20.0f64.sqrt()).abs() < 1e-9);
        assert!(TensorStats::from_values(Vec::new()).is_none());
    }
}
