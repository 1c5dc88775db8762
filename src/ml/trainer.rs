// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Generic fit / test loop for any ImageClassifier.
//
//   fit:  prepare + setup(Fit)
//         for each epoch:
//           train batches  → cross-entropy, backward, SGD step
//           every n epochs → validate on model.valid()
//           callbacks may request stop
//   test: prepare + setup(Test), one pass, test/loss + test/acc
//
// Key Burn insight:
//   - Training uses B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation loader must also use B::InnerBackend
//
// fast_dev_run runs one batch per loader for one epoch and
// writes nothing: no metrics, no watch stats, no checkpoints.
//
// Reference: Burn Book §5

use anyhow::Result;
use burn::{
    data::dataset::Dataset,
    module::{AutodiffModule, Param},
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::datamodule::{DataModule, ImageLoader};
use crate::domain::{error::ConfigError, stage::Stage};
use crate::infra::{
    checkpoint::ModuleSnapshot,
    tracker::{ExperimentLogger, WatchMode},
};
use crate::ml::{
    callbacks::{CallbackAction, CallbackContext, CallbackEnv, CallbackList},
    classifier::{ImageClassifier, ParamTensor},
    metrics::{correct_predictions, ClassificationAccumulator, MetricMap, ParamStats, TensorStats},
    optim::SgdSettings,
};

// ─── Settings ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSettings {
    pub max_epochs:              usize,
    pub log_every_n_steps:       usize,
    pub check_val_every_n_epoch: usize,
    /// Batch counts; None runs the whole loader
    pub limit_train_batches:     Option<usize>,
    pub limit_val_batches:       Option<usize>,
    pub limit_test_batches:      Option<usize>,
    pub fast_dev_run:            bool,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            max_epochs:              100,
            log_every_n_steps:       50,
            check_val_every_n_epoch: 1,
            limit_train_batches:     None,
            limit_val_batches:       None,
            limit_test_batches:      None,
            fast_dev_run:            false,
        }
    }
}

impl TrainerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_every_n_steps == 0 {
            return Err(ConfigError::NotPositive { name: "log_every_n_steps" });
        }
        if self.check_val_every_n_epoch == 0 {
            return Err(ConfigError::NotPositive { name: "check_val_every_n_epoch" });
        }
        Ok(())
    }

    fn epochs(&self) -> usize {
        if self.fast_dev_run { 1 } else { self.max_epochs }
    }

    fn limit(&self, limit: Option<usize>) -> Option<usize> {
        if self.fast_dev_run { Some(1) } else { limit }
    }
}

/// Batches a loader over `items` will yield, capped by `limit`
pub fn num_batches(items: usize, batch_size: usize, limit: Option<usize>) -> usize {
    let full = items.div_ceil(batch_size.max(1));
    limit.map_or(full, |l| l.min(full))
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer {
    settings:    TrainerSettings,
    optimizer:   SgdSettings,
    logger:      Box<dyn ExperimentLogger>,
    callbacks:   CallbackList,
    global_step: usize,
}

impl Trainer {
    pub fn new(
        settings:  TrainerSettings,
        optimizer: SgdSettings,
        logger:    Box<dyn ExperimentLogger>,
        callbacks: CallbackList,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        optimizer.validate()?;
        Ok(Self { settings, optimizer, logger, callbacks, global_step: 0 })
    }

    #[cfg(test)]
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    pub fn logger_mut(&mut self) -> &mut dyn ExperimentLogger {
        self.logger.as_mut()
    }

    /// Train `model` on the fit split of `datamodule` and return it.
    pub fn fit<B, M>(&mut self, mut model: M, datamodule: &mut DataModule, device: &B::Device) -> Result<M>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        datamodule.prepare()?;
        datamodule.setup(Some(Stage::Fit))?;

        let batch_size    = datamodule.config().batch_size;
        let train_batches = num_batches(
            datamodule.train_dataset().map_or(0, |d| d.len()),
            batch_size,
            self.settings.limit(self.settings.limit_train_batches),
        );
        let val_batches = num_batches(
            datamodule.val_dataset().map_or(0, |d| d.len()),
            batch_size,
            self.settings.limit(self.settings.limit_val_batches),
        );

        // ── Data loaders (train: AutodiffBackend, val: InnerBackend) ──────────
        let train_loader = datamodule.train_loader::<B>(device)?;
        let val_loader   = datamodule.val_loader::<B::InnerBackend>(device)?;

        let mut optim  = self.optimizer.to_config()?.init::<B, M>();
        let lr         = self.optimizer.lr;
        let dry_run    = self.settings.fast_dev_run;
        let max_epochs = self.settings.epochs();

        let mut ctx = CallbackContext { max_epochs, lr, dry_run, ..Default::default() };

        tracing::info!(
            "Fitting for up to {} epochs: {} train batches, {} validation batches per epoch",
            max_epochs, train_batches, val_batches
        );
        {
            let snapshot = ModuleSnapshot::<B, M>::new(&model);
            let mut env  = CallbackEnv { logger: self.logger.as_mut(), model: &snapshot };
            self.callbacks.on_fit_start(&ctx, &mut env)?;
        }

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in 0..max_epochs {
            ctx.epoch       = epoch;
            ctx.global_step = self.global_step;
            ctx.batch_loss  = None;
            ctx.metrics.clear();
            {
                let snapshot = ModuleSnapshot::<B, M>::new(&model);
                let mut env  = CallbackEnv { logger: self.logger.as_mut(), model: &snapshot };
                self.callbacks.on_epoch_start(&ctx, &mut env)?;
            }

            // ── Training phase ────────────────────────────────────────────────
            let mut train_acc = ClassificationAccumulator::default();
            ctx.num_batches = train_batches;
            self.callbacks.on_stage_start(Stage::Fit, &ctx);

            for (batch_idx, batch) in train_loader.iter().take(train_batches).enumerate() {
                let n      = batch.len();
                let logits = model.forward(batch.images);
                let loss   = CrossEntropyLossConfig::new()
                    .init(&logits.device())
                    .forward(logits.clone(), batch.targets.clone());

                let loss_value = loss.clone().into_scalar().elem::<f64>();
                let correct    = correct_predictions(logits, batch.targets);

                // Backward pass + SGD update
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                self.global_step += 1;

                if !dry_run {
                    self.log_watch_stats::<B, M>(&model, &grads)?;
                }
                model = optim.step(lr, model, grads);

                train_acc.update(loss_value, correct, n);
                ctx.global_step = self.global_step;
                ctx.batch_idx   = batch_idx;
                ctx.batch_loss  = Some(loss_value);

                if !dry_run && self.global_step % self.settings.log_every_n_steps == 0 {
                    let mut step_metrics = MetricMap::new();
                    step_metrics.insert("train/loss_step".into(), loss_value);
                    step_metrics.insert("train/acc_step".into(), correct as f64 / n.max(1) as f64);
                    step_metrics.insert("epoch".into(), epoch as f64);
                    self.logger.log_metrics(&step_metrics, self.global_step)?;
                }
                self.callbacks.on_batch_end(Stage::Fit, &ctx);
            }

            ctx.metrics.extend(train_acc.metrics("train"));
            self.callbacks.on_stage_end(Stage::Fit, &ctx);

            // ── Validation phase ──────────────────────────────────────────────
            let mut stop = false;
            let validate = (epoch + 1) % self.settings.check_val_every_n_epoch == 0 && val_batches > 0;
            if validate {
                // model.valid() → model on InnerBackend, dropout disabled
                let model_valid = model.valid();
                let val_acc     = self.evaluate(&model_valid, &val_loader, Stage::Validate, val_batches, &mut ctx);
                ctx.metrics.extend(val_acc.metrics("val"));

                let snapshot = ModuleSnapshot::<B, M>::new(&model);
                let mut env  = CallbackEnv { logger: self.logger.as_mut(), model: &snapshot };
                stop |= self.callbacks.on_validation_end(&ctx, &mut env)? == CallbackAction::Stop;
            }

            ctx.metrics.insert("epoch".into(), epoch as f64);
            if !dry_run {
                self.logger.log_metrics(&ctx.metrics, self.global_step)?;
            }

            println!(
                "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_loss={} | val_acc={}",
                epoch + 1,
                max_epochs,
                train_acc.loss(),
                train_acc.accuracy() * 100.0,
                ctx.metrics.get("val/loss").map_or("-".to_string(), |v| format!("{v:.4}")),
                ctx.metrics.get("val/acc").map_or("-".to_string(), |v| format!("{:.1}%", v * 100.0)),
            );

            {
                let snapshot = ModuleSnapshot::<B, M>::new(&model);
                let mut env  = CallbackEnv { logger: self.logger.as_mut(), model: &snapshot };
                stop |= self.callbacks.on_epoch_end(&ctx, &mut env)? == CallbackAction::Stop;
            }

            if stop {
                tracing::info!("Stopping after epoch {}", epoch + 1);
                break;
            }
        }

        {
            let snapshot = ModuleSnapshot::<B, M>::new(&model);
            let mut env  = CallbackEnv { logger: self.logger.as_mut(), model: &snapshot };
            self.callbacks.on_fit_end(&ctx, &mut env)?;
        }

        tracing::info!("Training complete after {} steps", self.global_step);
        Ok(model)
    }

    /// Evaluate `model` on the test split. Returns one metric map
    /// per test loader (there is exactly one).
    pub fn test<B, M>(&mut self, model: &M, datamodule: &mut DataModule, device: &B::Device) -> Result<Vec<MetricMap>>
    where
        B: Backend,
        M: ImageClassifier<B>,
    {
        datamodule.prepare()?;
        datamodule.setup(Some(Stage::Test))?;

        let batches = num_batches(
            datamodule.test_dataset().map_or(0, |d| d.len()),
            datamodule.config().batch_size,
            self.settings.limit(self.settings.limit_test_batches),
        );
        let loader = datamodule.test_loader::<B>(device)?;

        let mut ctx = CallbackContext {
            global_step: self.global_step,
            dry_run:     self.settings.fast_dev_run,
            ..Default::default()
        };
        let acc     = self.evaluate(model, &loader, Stage::Test, batches, &mut ctx);
        let metrics = acc.metrics("test");

        if !self.settings.fast_dev_run {
            self.logger.log_metrics(&metrics, self.global_step)?;
        }

        println!("Test metric          DataLoader 0");
        for (name, value) in &metrics {
            println!("{name:<20} {value:.6}");
        }

        Ok(vec![metrics])
    }

    // ── Shared evaluation pass ────────────────────────────────────────────────
    fn evaluate<B, M>(
        &mut self,
        model:   &M,
        loader:  &ImageLoader<B>,
        stage:   Stage,
        batches: usize,
        ctx:     &mut CallbackContext,
    ) -> ClassificationAccumulator
    where
        B: Backend,
        M: ImageClassifier<B>,
    {
        let mut acc = ClassificationAccumulator::default();
        ctx.num_batches = batches;
        ctx.batch_loss  = None;
        self.callbacks.on_stage_start(stage, ctx);

        for (batch_idx, batch) in loader.iter().take(batches).enumerate() {
            let n      = batch.len();
            let logits = model.forward(batch.images);
            let loss   = CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits.clone(), batch.targets.clone())
                .into_scalar()
                .elem::<f64>();
            let correct = correct_predictions(logits, batch.targets);

            acc.update(loss, correct, n);
            ctx.batch_idx  = batch_idx;
            ctx.batch_loss = Some(loss);
            self.callbacks.on_batch_end(stage, ctx);
        }

        self.callbacks.on_stage_end(stage, ctx);
        acc
    }

    // ── Watch statistics ──────────────────────────────────────────────────────
    fn log_watch_stats<B, M>(&mut self, model: &M, grads: &GradientsParams) -> Result<()>
    where
        B: AutodiffBackend,
        M: ImageClassifier<B>,
    {
        let Some((mode, log_freq)) = self.logger.watching() else {
            return Ok(());
        };
        if self.global_step % log_freq != 0 {
            return Ok(());
        }

        let stats = watch_stats::<B, M>(model, grads, mode);
        self.logger.log_parameter_stats(&stats, self.global_step)
    }
}

/// Statistics of every named parameter (and its gradient) of `model`
pub fn watch_stats<B, M>(model: &M, grads: &GradientsParams, mode: WatchMode) -> Vec<ParamStats>
where
    B: AutodiffBackend,
    M: ImageClassifier<B>,
{
    model
        .named_parameters()
        .into_iter()
        .map(|(name, param)| {
            let (value, grad) = match param {
                ParamTensor::Vector(p) => param_stats(&p, grads, mode),
                ParamTensor::Matrix(p) => param_stats(&p, grads, mode),
                ParamTensor::Kernel(p) => param_stats(&p, grads, mode),
            };
            ParamStats { name, value, grad }
        })
        .collect()
}

fn param_stats<B: AutodiffBackend, const D: usize>(
    param: &Param<Tensor<B, D>>,
    grads: &GradientsParams,
    mode:  WatchMode,
) -> (Option<TensorStats>, Option<TensorStats>) {
    let value = if mode.values() { TensorStats::of(param.val()) } else { None };
    let grad  = if mode.gradients() {
        grads
            .get::<B::InnerBackend, D>(param.id)
            .and_then(|g| TensorStats::of(g))
    } else {
        None
    };
    (value, grad)
}
