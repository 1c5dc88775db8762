// ============================================================
// Layer 3 — Lifecycle Stages
// ============================================================
// `Stage` is what the trainer asks the data module to prepare.
// Only `Fit` and `Test` (or no stage at all) load anything;
// the other stages are accepted and ignored by the data module.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fit,
    Validate,
    Test,
    Predict,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fit      => "fit",
            Stage::Validate => "validate",
            Stage::Test     => "test",
            Stage::Predict  => "predict",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fit"      => Ok(Stage::Fit),
            "validate" => Ok(Stage::Validate),
            "test"     => Ok(Stage::Test),
            "predict"  => Ok(Stage::Predict),
            _ => Err(ConfigError::UnknownChoice {
                kind:    "stage",
                value:   s.to_string(),
                choices: "fit, validate, test, predict",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage() {
        assert_eq!("FIT".parse::<Stage>().unwrap(), Stage::Fit);
        assert_eq!("test".parse::<Stage>().unwrap(), Stage::Test);
        assert!("train".parse::<Stage>().is_err());
    }
}
