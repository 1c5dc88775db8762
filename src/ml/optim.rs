// ============================================================
// Layer 5 — SGD Optimizer Settings
// ============================================================
// Plain SGD with optional momentum, Nesterov and L2 weight
// decay. Dampening is always 0, so with momentum μ:
//
//   v = μ * v + g
//   θ = θ - lr * (nesterov ? g + μ * v : v)
//
// Reference: Sutskever et al. (2013)

use burn::optim::{momentum::MomentumConfig, decay::WeightDecayConfig, SgdConfig};
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Name the learning-rate monitor reports under ("lr-SGD")
pub const OPTIMIZER_NAME: &str = "SGD";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdSettings {
    pub lr:           f64,
    pub momentum:     f64,
    pub weight_decay: f64,
    pub nesterov:     bool,
}

impl Default for SgdSettings {
    fn default() -> Self {
        Self { lr: 0.1, momentum: 0.0, weight_decay: 0.0, nesterov: false }
    }
}

impl SgdSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lr <= 0.0 {
            return Err(ConfigError::NotPositive { name: "lr" });
        }
        if self.nesterov && self.momentum <= 0.0 {
            return Err(ConfigError::NesterovWithoutMomentum);
        }
        Ok(())
    }

    pub fn to_config(&self) -> Result<SgdConfig, ConfigError> {
        self.validate()?;

        let mut config = SgdConfig::new();
        if self.momentum > 0.0 {
            config = config.with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(self.momentum)
                    .with_dampening(0.0)
                    .with_nesterov(self.nesterov),
            ));
        }
        if self.weight_decay > 0.0 {
            config = config.with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay as f32)));
        }
        Ok(config)
    }
}
