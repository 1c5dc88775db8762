// ============================================================
// Layer 3 — Monitor Mode
// ============================================================
// Direction in which a monitored metric improves. Shared by
// early stopping and checkpoint ranking.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Min,
    Max,
}

impl MonitorMode {
    /// Starting "best" value that any finite score beats
    pub fn worst(self) -> f64 {
        match self {
            Self::Min => f64::INFINITY,
            Self::Max => f64::NEG_INFINITY,
        }
    }

    /// Strictly better by more than `min_delta`
    pub fn is_improvement(self, current: f64, best: f64, min_delta: f64) -> bool {
        match self {
            Self::Min => best - current > min_delta,
            Self::Max => current - best > min_delta,
        }
    }

    /// Ranking order: true when `a` should be kept over `b`
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.is_improvement(a, b, 0.0)
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "min",
            Self::Max => "max",
        })
    }
}

impl FromStr for MonitorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(ConfigError::UnknownChoice {
                kind:    "monitor mode",
                value:   s.to_string(),
                choices: "min, max",
            }),
        }
    }
}
