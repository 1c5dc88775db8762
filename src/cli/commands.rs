// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `run`, `test` and `prepare`
// and all their configurable flags.
//
// Registry flags (--dataset, --model, --transforms,
// --accelerator, --callbacks-mode) are parsed through FromStr,
// so an unknown name is rejected by clap with the choices listed.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::{
    experiment::{CallbackSettings, ExperimentConfig, ModelSettings, RunSettings},
    registry::{Accelerator, DatasetKind, ModelKind, TransformKind},
};
use crate::data::datamodule::DataConfig;
use crate::domain::monitor::MonitorMode;
use crate::ml::{optim::SgdSettings, trainer::TrainerSettings};

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train, then evaluate on the test split
    Run(ExperimentArgs),

    /// Evaluate only, optionally from a saved checkpoint
    Test(TestArgs),

    /// Download a dataset into the cache
    Prepare(PrepareArgs),
}

/// Every flag shared by `run` and `test`.
#[derive(Args, Debug, Clone)]
pub struct ExperimentArgs {
    // ── Run ──────────────────────────────────────────────────────────────────
    /// Seed for Burn and the data pipeline
    #[arg(long, default_value_t = 9423)]
    pub seed: u64,

    /// Experiment output goes to <default-root-dir>/<experiment-name>
    #[arg(long)]
    pub experiment_name: String,

    /// Copy checkpoints into the tracker run directory
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub artifact_save_to_logger: bool,

    // ── Data ─────────────────────────────────────────────────────────────────
    /// Dataset cache directory
    #[arg(long)]
    pub root_dir: PathBuf,

    /// MNIST, CIFAR10 or CIFAR100
    #[arg(long)]
    pub dataset: DatasetKind,

    /// Transform pipeline family
    #[arg(long, default_value = "BASE")]
    pub transforms: TransformKind,

    /// Loader worker threads (0 loads on the calling thread)
    #[arg(long, default_value_t = 16)]
    pub num_workers: usize,

    /// Channels of the images fed to the model
    #[arg(long, default_value_t = 3)]
    pub image_channels: usize,

    /// Height and width of the images fed to the model
    #[arg(long)]
    pub image_size: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    // ── Model ────────────────────────────────────────────────────────────────
    /// VGG or ALEXNET
    #[arg(long)]
    pub model: ModelKind,

    /// VGG depth: vgg11, vgg13, vgg16, vgg19 (add _bn for batch-norm)
    #[arg(long, default_value = "vgg16")]
    pub model_type: String,

    /// Defaults to the dataset's class count
    #[arg(long)]
    pub num_classes: Option<usize>,

    #[arg(long, default_value_t = 0.5)]
    pub dropout_rate: f64,

    /// Width of the two hidden classifier layers
    #[arg(long, default_value_t = 512)]
    pub classifier_hidden: usize,

    // ── Callbacks ────────────────────────────────────────────────────────────
    /// Log every checkpoint and early-stopping decision
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub callbacks_verbose: bool,

    /// Metric watched by early stopping and checkpointing
    #[arg(long, default_value = "val/acc")]
    pub callbacks_monitor: String,

    /// min or max
    #[arg(long, default_value = "max")]
    pub callbacks_mode: MonitorMode,

    #[arg(long, default_value_t = 0.1)]
    pub earlystopping_min_delta: f64,

    /// Defaults to max-epochs / 2
    #[arg(long)]
    pub earlystopping_patience: Option<usize>,

    // ── Optimizer ────────────────────────────────────────────────────────────
    #[arg(long, default_value_t = 0.1)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.0)]
    pub momentum: f64,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    #[arg(long)]
    pub nesterov: bool,

    // ── Trainer ──────────────────────────────────────────────────────────────
    #[arg(long, default_value_t = 100)]
    pub max_epochs: usize,

    #[arg(long, default_value_t = 50)]
    pub log_every_n_steps: usize,

    #[arg(long, default_value_t = 1)]
    pub check_val_every_n_epoch: usize,

    /// Cap on training batches per epoch
    #[arg(long)]
    pub limit_train_batches: Option<usize>,

    #[arg(long)]
    pub limit_val_batches: Option<usize>,

    #[arg(long)]
    pub limit_test_batches: Option<usize>,

    /// One batch of each stage; nothing is written
    #[arg(long)]
    pub fast_dev_run: bool,

    /// cpu or wgpu
    #[arg(long, default_value = "cpu")]
    pub accelerator: Accelerator,

    #[arg(long, default_value = ".")]
    pub default_root_dir: PathBuf,
}

/// Arguments for the `test` command
#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// "best", "last" or a checkpoint file
    #[arg(long)]
    pub ckpt_path: Option<String>,
}

/// Arguments for the `prepare` command
#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[arg(long)]
    pub dataset: DatasetKind,

    #[arg(long)]
    pub root_dir: PathBuf,
}

/// Convert CLI args into the application-layer ExperimentConfig.
/// The application layer never sees clap types.
impl From<ExperimentArgs> for ExperimentConfig {
    fn from(a: ExperimentArgs) -> Self {
        ExperimentConfig {
            run: RunSettings {
                seed:                    a.seed,
                experiment_name:         a.experiment_name,
                default_root_dir:        a.default_root_dir,
                artifact_save_to_logger: a.artifact_save_to_logger,
                accelerator:             a.accelerator,
            },
            dataset:    a.dataset,
            transforms: a.transforms,
            data: DataConfig {
                root_dir:    a.root_dir,
                batch_size:  a.batch_size,
                num_workers: a.num_workers,
                image_shape: [a.image_channels, a.image_size, a.image_size],
            },
            model: ModelSettings {
                model:             a.model,
                model_type:        a.model_type,
                num_classes:       a.num_classes,
                dropout_rate:      a.dropout_rate,
                classifier_hidden: a.classifier_hidden,
            },
            optimizer: SgdSettings {
                lr:           a.lr,
                momentum:     a.momentum,
                weight_decay: a.weight_decay,
                nesterov:     a.nesterov,
            },
            callbacks: CallbackSettings {
                verbose:   a.callbacks_verbose,
                monitor:   a.callbacks_monitor,
                mode:      a.callbacks_mode,
                min_delta: a.earlystopping_min_delta,
                patience:  a.earlystopping_patience,
                ..Default::default()
            },
            trainer: TrainerSettings {
                max_epochs:              a.max_epochs,
                log_every_n_steps:       a.log_every_n_steps,
                check_val_every_n_epoch: a.check_val_every_n_epoch,
                limit_train_batches:     a.limit_train_batches,
                limit_val_batches:       a.limit_val_batches,
                limit_test_batches:      a.limit_test_batches,
                fast_dev_run:            a.fast_dev_run,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    const REQUIRED: [&str; 10] = [
        "--experiment-name", "exp",
        "--root-dir", "data",
        "--dataset", "cifar10",
        "--image-size", "32",
        "--model", "vgg",
    ];

    fn parse(sub: &str, extra: &[&str]) -> Result<Cli, clap::Error> {
        let mut argv = vec!["convnet-experiment", sub];
        argv.extend(REQUIRED);
        argv.extend(extra);
        Cli::try_parse_from(argv)
    }

    #[test]
    fn test_run_defaults() {
        let Commands::Run(args) = parse("run", &[]).unwrap().command else {
            panic!("expected run");
        };
        let cfg = ExperimentConfig::from(args);

        assert_eq!(cfg.run.seed, 9423);
        assert!(cfg.run.artifact_save_to_logger);
        assert!(cfg.callbacks.verbose);
        assert_eq!(cfg.dataset, DatasetKind::Cifar10);
        assert_eq!(cfg.data.image_shape, [3, 32, 32]);
        assert_eq!(cfg.data.batch_size, 64);
        assert_eq!(cfg.data.num_workers, 16);
        assert_eq!(cfg.model.model_type, "vgg16");
        assert_eq!(cfg.callbacks.mode, MonitorMode::Max);
        assert_eq!(cfg.callbacks.save_top_k, 5);
        assert_eq!(cfg.optimizer.lr, 0.1);
        assert_eq!(cfg.trainer.max_epochs, 100);
        assert_eq!(cfg.run.accelerator, Accelerator::Cpu);
        assert_eq!(cfg.patience(), 50);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_boolean_flags_take_values() {
        let extra = ["--artifact-save-to-logger", "false", "--callbacks-verbose", "false", "--nesterov"];
        let Commands::Run(args) = parse("run", &extra).unwrap().command else {
            panic!("expected run");
        };
        let cfg = ExperimentConfig::from(args);
        assert!(!cfg.run.artifact_save_to_logger);
        assert!(!cfg.callbacks.verbose);
        assert!(cfg.optimizer.nesterov);
    }

    #[test]
    fn test_unknown_dataset_is_rejected() {
        let argv = [
            "convnet-experiment", "run",
            "--experiment-name", "exp", "--root-dir", "data", "--dataset", "imagenet",
            "--image-size", "32", "--model", "vgg",
        ];
        let err = Cli::try_parse_from(argv).unwrap_err();
        assert!(err.to_string().contains("CIFAR10"));
    }

    #[test]
    fn test_test_command_takes_checkpoint() {
        let Commands::Test(args) = parse("test", &["--ckpt-path", "best"]).unwrap().command else {
            panic!("expected test");
        };
        assert_eq!(args.ckpt_path.as_deref(), Some("best"));
    }

    #[test]
    fn test_missing_required_flag() {
        assert!(Cli::try_parse_from(["convnet-experiment", "run", "--dataset", "MNIST"]).is_err());
    }
}
