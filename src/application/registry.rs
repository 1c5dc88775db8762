// ============================================================
// Layer 2 — Registries
// ============================================================
// Closed sets of names the command line may select from.
// Names are matched case-insensitively and parsed by clap, so
// a typo fails before any directory is created or any byte is
// downloaded, with the valid choices in the message.
//
//   --dataset     MNIST | CIFAR10 | CIFAR100
//   --model       VGG | ALEXNET
//   --transforms  BASE
//   --accelerator cpu | wgpu

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::data::{
    cifar::{Cifar10, Cifar100},
    mnist::Mnist,
    transforms::{BaseTransforms, Compose},
};
use crate::domain::{error::ConfigError, traits::DatasetProvider};

macro_rules! registry {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal, $choices:literal, { $($variant:ident => $key:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $key)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = s.trim().to_uppercase();
                $(
                    if key == $key.to_uppercase() {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ConfigError::UnknownChoice {
                    kind:    $kind,
                    value:   s.to_string(),
                    choices: $choices,
                })
            }
        }
    };
}

registry!(
    /// Datasets the data module can wrap
    DatasetKind, "dataset", "MNIST, CIFAR10, CIFAR100", {
        Mnist    => "MNIST",
        Cifar10  => "CIFAR10",
        Cifar100 => "CIFAR100",
    }
);

registry!(
    /// Model families
    ModelKind, "model", "VGG, ALEXNET", {
        Vgg     => "VGG",
        AlexNet => "ALEXNET",
    }
);

registry!(
    /// Transform pipeline families
    TransformKind, "transforms", "BASE", {
        Base => "BASE",
    }
);

registry!(
    /// Device the experiment runs on
    Accelerator, "accelerator", "cpu, wgpu", {
        Cpu  => "cpu",
        Wgpu => "wgpu",
    }
);

impl DatasetKind {
    pub fn provider(self) -> Box<dyn DatasetProvider> {
        match self {
            Self::Mnist    => Box::new(Mnist),
            Self::Cifar10  => Box::new(Cifar10),
            Self::Cifar100 => Box::new(Cifar100),
        }
    }
}

impl TransformKind {
    pub fn build(self, image_shape: [usize; 3], train: bool) -> Result<Compose, ConfigError> {
        match self {
            Self::Base => BaseTransforms::build(image_shape, train),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        assert_eq!("cifar10".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar10);
        assert_eq!("Cifar100".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar100);
        assert_eq!("vgg".parse::<ModelKind>().unwrap(), ModelKind::Vgg);
        assert_eq!("AlexNet".parse::<ModelKind>().unwrap(), ModelKind::AlexNet);
        assert_eq!("base".parse::<TransformKind>().unwrap(), TransformKind::Base);
        assert_eq!("WGPU".parse::<Accelerator>().unwrap(), Accelerator::Wgpu);
    }

    #[test]
    fn test_unknown_names_list_choices() {
        let err = "IMAGENET".parse::<DatasetKind>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownChoice { kind: "dataset", value: "IMAGENET".into(), choices: "MNIST, CIFAR10, CIFAR100" }
        );
        assert!("resnet".parse::<ModelKind>().unwrap_err().to_string().contains("VGG, ALEXNET"));
        assert!("FANCY".parse::<TransformKind>().is_err());
        assert!("tpu".parse::<Accelerator>().is_err());
    }

    #[test]
    fn test_providers_match_names() {
        for kind in [DatasetKind::Mnist, DatasetKind::Cifar10, DatasetKind::Cifar100] {
            assert_eq!(kind.provider().name(), kind.as_str());
        }
        assert_eq!(DatasetKind::Mnist.provider().channels(), 1);
        assert_eq!(DatasetKind::Cifar100.provider().num_classes(), 100);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&ModelKind::AlexNet).unwrap(), "\"ALEXNET\"");
    }
}
