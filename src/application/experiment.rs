// ============================================================
// Layer 2 — Experiment Driver
// ============================================================
// Wires every other layer into one run:
//
//   Step 1: Validate the whole config   (before any I/O)
//   Step 2: Seed everything             (Layer 6 - infra)
//   Step 3: Build transforms + data     (Layer 4 - data)
//   Step 4: Build + initialize model    (Layer 5 - ml)
//   Step 5: Checkpoint dir + hparams    (Layer 6 - infra)
//   Step 6: Tracker, watch, callbacks   (Layer 5/6)
//   Step 7: fit → unwatch → test        (Layer 5 - ml)
//
// The accelerator and the model kind are resolved once, here,
// into concrete Burn backend and module types.
//
// Reference: Burn Book §5 (Training)

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::registry::{Accelerator, DatasetKind, ModelKind, TransformKind};
use crate::data::datamodule::{prepare_dataset, DataConfig, DataModule};
use crate::domain::{error::ConfigError, monitor::MonitorMode};
use crate::infra::{
    checkpoint::{load_model, make_checkpoint_dir, resolve_checkpoint},
    seed::{data_seeds, seed_everything},
    tracker::{ExperimentLogger, LocalTracker, RunStatus, WatchMode},
};
use crate::ml::{
    alexnet::AlexNetConfig,
    callbacks::{
        checkpoint::DEFAULT_FILENAME, progress::DEFAULT_REFRESH_RATE, CallbackList, EarlyStopping,
        LearningRateMonitor, ModelCheckpoint, ProgressBar,
    },
    classifier::ImageClassifier,
    metrics::MetricMap,
    optim::{SgdSettings, OPTIMIZER_NAME},
    trainer::{Trainer, TrainerSettings},
    vgg::{VggConfig, VggType},
};

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub seed:                    u64,
    pub experiment_name:         String,
    /// Experiment output goes to <default_root_dir>/<experiment_name>
    pub default_root_dir:        PathBuf,
    /// Copy checkpoints into the tracker's run directory
    pub artifact_save_to_logger: bool,
    pub accelerator:             Accelerator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model:             ModelKind,
    /// VGG depth, e.g. "vgg16" or "vgg11_bn"
    pub model_type:        String,
    /// None uses the dataset's class count
    pub num_classes:       Option<usize>,
    pub dropout_rate:      f64,
    pub classifier_hidden: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackSettings {
    pub verbose:      bool,
    pub monitor:      String,
    pub mode:         MonitorMode,
    pub min_delta:    f64,
    /// None means max_epochs / 2
    pub patience:     Option<usize>,
    pub save_top_k:   usize,
    pub filename:     String,
    pub refresh_rate: usize,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            verbose:      true,
            monitor:      "val/acc".to_string(),
            mode:         MonitorMode::Max,
            min_delta:    0.1,
            patience:     None,
            save_top_k:   5,
            filename:     DEFAULT_FILENAME.to_string(),
            refresh_rate: DEFAULT_REFRESH_RATE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub run:        RunSettings,
    pub dataset:    DatasetKind,
    pub transforms: TransformKind,
    pub data:       DataConfig,
    pub model:      ModelSettings,
    pub optimizer:  SgdSettings,
    pub callbacks:  CallbackSettings,
    pub trainer:    TrainerSettings,
}

impl ExperimentConfig {
    /// <default_root_dir>/<experiment_name>
    pub fn save_dir(&self) -> PathBuf {
        self.run.default_root_dir.join(&self.run.experiment_name)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.save_dir().join("ckpt")
    }

    pub fn patience(&self) -> usize {
        self.callbacks.patience.unwrap_or(self.trainer.max_epochs / 2)
    }

    pub fn num_classes(&self) -> usize {
        self.model.num_classes.unwrap_or_else(|| self.dataset.provider().num_classes())
    }

    /// Reject anything that would fail later, without touching the disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = self.dataset.provider();
        let shape    = self.data.image_shape;

        if shape[1] == 0 {
            return Err(ConfigError::NotPositive { name: "image_size" });
        }
        if self.data.batch_size == 0 {
            return Err(ConfigError::NotPositive { name: "batch_size" });
        }
        if provider.channels() != shape[0] {
            return Err(ConfigError::ChannelMismatch {
                dataset:    provider.name(),
                native:     provider.channels(),
                configured: shape[0],
            });
        }
        if let Some(n) = self.model.num_classes {
            if n != provider.num_classes() {
                return Err(ConfigError::ClassMismatch {
                    dataset:    provider.name(),
                    native:     provider.num_classes(),
                    configured: n,
                });
            }
        }

        self.transforms.build(shape, true)?;
        match self.model.model {
            ModelKind::Vgg     => self.vgg_config()?.check_image_size(shape[1])?,
            ModelKind::AlexNet => self.alexnet_config().check_image_size(shape[1])?,
        }
        self.optimizer.validate()?;
        self.trainer.validate()
    }

    fn vgg_config(&self) -> Result<VggConfig, ConfigError> {
        let model_type: VggType = self.model.model_type.parse()?;
        Ok(VggConfig::new(model_type, self.data.image_shape[0], self.num_classes())
            .with_hidden(self.model.classifier_hidden)
            .with_dropout(self.model.dropout_rate))
    }

    fn alexnet_config(&self) -> AlexNetConfig {
        AlexNetConfig::new(self.data.image_shape[0], self.num_classes())
            .with_hidden(self.model.classifier_hidden)
            .with_dropout(self.model.dropout_rate)
    }
}

/// What `Experiment::run` does after building everything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// fit, unwatch, test
    FitAndTest,
    /// unwatch, test; optionally restoring "best", "last" or a file first
    TestOnly { ckpt_path: Option<String> },
}

// ─── Experiment ───────────────────────────────────────────────────────────────
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Download the dataset into the cache without training.
    pub fn prepare_data(dataset: DatasetKind, root_dir: PathBuf) -> Result<()> {
        let provider = dataset.provider();
        prepare_dataset(provider.as_ref(), &root_dir)?;
        tracing::info!("{} is cached in '{}'", provider.name(), root_dir.display());
        Ok(())
    }

    /// Run the experiment and return one metric map per test loader.
    pub fn run(&self, mode: RunMode) -> Result<Vec<MetricMap>> {
        match self.config.run.accelerator {
            Accelerator::Cpu => {
                tracing::info!("Using NdArray CPU backend");
                self.execute::<Autodiff<NdArray<f32>>>(Default::default(), mode)
            }
            Accelerator::Wgpu => {
                let device = burn::backend::wgpu::WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.execute::<Autodiff<Wgpu>>(device, mode)
            }
        }
    }

    fn execute<B: AutodiffBackend>(&self, device: B::Device, mode: RunMode) -> Result<Vec<MetricMap>> {
        let cfg = &self.config;

        // ── Step 2: Seed every random source ──────────────────────────────────
        let mut rng = seed_everything::<B>(cfg.run.seed);
        let seeds   = data_seeds(&mut rng);

        // ── Step 3: Transforms + data module ──────────────────────────────────
        let shape = cfg.data.image_shape;
        let datamodule = DataModule::new(
            cfg.dataset.provider(),
            cfg.data.clone(),
            cfg.transforms.build(shape, true)?,
            cfg.transforms.build(shape, false)?,
            seeds,
        )?;

        // ── Step 4: Model ─────────────────────────────────────────────────────
        match cfg.model.model {
            ModelKind::Vgg => {
                let model = cfg.vgg_config()?.init::<B>(&device).initialize_weights();
                tracing::info!("Model ready: {}", cfg.model.model_type);
                self.drive::<B, _>(model, datamodule, device, mode)
            }
            ModelKind::AlexNet => {
                let model = cfg.alexnet_config().init::<B>(&device).initialize_weights();
                tracing::info!("Model ready: alexnet");
                self.drive::<B, _>(model, datamodule, device, mode)
            }
        }
    }

    fn drive<B, M>(&self, model: M, mut datamodule: DataModule, device: B::Device, mode: RunMode) -> Result<Vec<MetricMap>>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        let cfg = &self.config;

        // ── Step 5: Checkpoint dir + resolved config ──────────────────────────
        let save_dir = cfg.save_dir();
        let ckpt_dir = make_checkpoint_dir(&cfg.checkpoint_dir())?;
        let hparams  = serde_json::to_value(cfg)?;
        fs::write(save_dir.join("hparams.json"), serde_json::to_string_pretty(&hparams)?)
            .with_context(|| format!("Cannot write hparams.json to '{}'", save_dir.display()))?;

        // ── Step 6: Tracker + callbacks ───────────────────────────────────────
        let mut tracker = LocalTracker::new(&save_dir, &cfg.run.experiment_name, cfg.run.artifact_save_to_logger)?;
        tracker.log_hyperparams(&hparams)?;
        tracker.watch(WatchMode::All, cfg.trainer.log_every_n_steps);

        let callbacks   = self.callbacks(ckpt_dir.clone());
        let mut trainer = Trainer::new(cfg.trainer.clone(), cfg.optimizer, Box::new(tracker), callbacks)?;

        // ── Step 7: Train / test ──────────────────────────────────────────────
        let outcome = run_mode::<B, M>(&mut trainer, model, &mut datamodule, &device, &ckpt_dir, mode);

        let status = if outcome.is_ok() { RunStatus::Finished } else { RunStatus::Failed };
        trainer.logger_mut().finalize(status)?;
        outcome
    }

    fn callbacks(&self, ckpt_dir: PathBuf) -> CallbackList {
        let cb = &self.config.callbacks;
        CallbackList::new(vec![
            Box::new(ProgressBar::new(cb.refresh_rate)),
            Box::new(LearningRateMonitor::new(OPTIMIZER_NAME)),
            Box::new(
                EarlyStopping::new(cb.monitor.clone(), cb.mode, cb.min_delta, self.config.patience())
                    .with_verbose(cb.verbose),
            ),
            Box::new(
                ModelCheckpoint::new(ckpt_dir, cb.monitor.clone(), cb.mode)
                    .with_filename(cb.filename.clone())
                    .with_save_top_k(cb.save_top_k)
                    .with_save_last(true)
                    .with_verbose(cb.verbose),
            ),
        ])
    }
}

fn run_mode<B, M>(
    trainer:    &mut Trainer,
    model:      M,
    datamodule: &mut DataModule,
    device:     &B::Device,
    ckpt_dir:   &std::path::Path,
    mode:       RunMode,
) -> Result<Vec<MetricMap>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    match mode {
        RunMode::FitAndTest => {
            let model = trainer.fit::<B, M>(model, datamodule, device)?;
            trainer.logger_mut().unwatch();
            trainer.test::<B::InnerBackend, _>(&model.valid(), datamodule, device)
        }
        RunMode::TestOnly { ckpt_path } => {
            trainer.logger_mut().unwatch();
            let mut model = model.valid();
            if let Some(which) = ckpt_path {
                let path = resolve_checkpoint(ckpt_dir, &which)?;
                model = load_model::<B::InnerBackend, _>(model, &path, device)?;
            }
            trainer.test::<B::InnerBackend, _>(&model, datamodule, device)
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cifar::write_cifar10_fixture;

    fn config(root: &std::path::Path) -> ExperimentConfig {
        ExperimentConfig {
            run: RunSettings {
                seed:                    9423,
                experiment_name:         "exp".into(),
                default_root_dir:        root.join("out"),
                artifact_save_to_logger: false,
                accelerator:             Accelerator::Cpu,
            },
            dataset:    DatasetKind::Cifar10,
            transforms: TransformKind::Base,
            data: DataConfig {
                root_dir:    root.join("data"),
                batch_size:  8,
                num_workers: 0,
                image_shape: [3, 32, 32],
            },
            model: ModelSettings {
                model:             ModelKind::AlexNet,
                model_type:        "vgg16".into(),
                num_classes:       None,
                dropout_rate:      0.5,
                classifier_hidden: 16,
            },
            optimizer: SgdSettings::default(),
            callbacks: CallbackSettings::default(),
            trainer: TrainerSettings {
                max_epochs:          1,
                limit_train_batches: Some(1),
                limit_val_batches:   Some(1),
                limit_test_batches:  Some(1),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_validation_errors_before_io() {
        let dir = tempfile::tempdir().unwrap();

        let mut cfg = config(dir.path());
        cfg.dataset = DatasetKind::Mnist;
        assert!(matches!(cfg.validate(), Err(ConfigError::ChannelMismatch { .. })));

        let mut cfg = config(dir.path());
        cfg.model.num_classes = Some(100);
        assert!(matches!(cfg.validate(), Err(ConfigError::ClassMismatch { native: 10, .. })));

        let mut cfg = config(dir.path());
        cfg.model.model = ModelKind::Vgg;
        cfg.data.image_shape = [3, 28, 28];
        assert!(matches!(cfg.validate(), Err(ConfigError::ImageTooSmall { .. })));

        let mut cfg = config(dir.path());
        cfg.model.model = ModelKind::Vgg;
        cfg.model.model_type = "vgg42".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::UnknownChoice { .. })));

        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn test_prepare_data_uses_cache() {
        let dir  = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        write_cifar10_fixture(&root, 10, 4);

        Experiment::prepare_data(DatasetKind::Cifar10, root.clone()).unwrap();
        assert!(DatasetKind::Cifar10.provider().is_cached(&root, crate::domain::image::Split::Test));
    }

    #[test]
    fn test_patience_defaults_to_half_max_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.trainer.max_epochs = 100;
        assert_eq!(cfg.patience(), 50);
        cfg.callbacks.patience = Some(3);
        assert_eq!(cfg.patience(), 3);
    }

    #[test]
    fn test_fit_and_test_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_cifar10_fixture(&cfg.data.root_dir, 20, 8);

        let experiment = Experiment::new(cfg.clone()).unwrap();
        let results    = experiment.run(RunMode::FitAndTest).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].contains_key("test/acc"));
        assert!(results[0].contains_key("test/loss"));

        let ckpt = cfg.checkpoint_dir();
        assert!(ckpt.join("last.mpk").is_file());
        assert!(cfg.save_dir().join("hparams.json").is_file());
        assert!(cfg.save_dir().join("runs").is_dir());

        // Restore the best checkpoint and evaluate only
        let restored = experiment
            .run(RunMode::TestOnly { ckpt_path: Some("best".into()) })
            .unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_checkpoint_dir_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_cifar10_fixture(&cfg.data.root_dir, 10, 4);

        let experiment = Experiment::new(cfg.clone()).unwrap();
        experiment.run(RunMode::TestOnly { ckpt_path: None }).unwrap();
        experiment.run(RunMode::TestOnly { ckpt_path: None }).unwrap();
        assert!(cfg.checkpoint_dir().is_dir());
    }
}
