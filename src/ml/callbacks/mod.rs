// ============================================================
// Layer 5 — Training Callbacks
// ============================================================
// Hooks the trainer calls at fixed points of fit and test:
//
//   fit start
//     └─ epoch start                 → LearningRateMonitor
//          ├─ stage start / batch end / stage end (train)
//          │                         → ProgressBar
//          └─ stage start / batch end / stage end (validate)
//               └─ validation end    → EarlyStopping, ModelCheckpoint
//     └─ epoch end
//   fit end
//
// Every hook has a no-op default, so a callback only overrides
// the events it cares about. Hooks receive the model only as a
// ModelSnapshot and the tracker as a trait object, which keeps
// callbacks free of backend generics.

use anyhow::Result;

use crate::domain::{stage::Stage, traits::ModelSnapshot};
use crate::infra::tracker::ExperimentLogger;
use crate::ml::metrics::MetricMap;

pub mod checkpoint;
pub mod early_stopping;
pub mod lr_monitor;
pub mod progress;

pub use checkpoint::ModelCheckpoint;
pub use early_stopping::EarlyStopping;
pub use lr_monitor::LearningRateMonitor;
pub use progress::ProgressBar;

/// Training state handed to every hook
#[derive(Debug, Clone, Default)]
pub struct CallbackContext {
    /// Current epoch (0-indexed)
    pub epoch:       usize,
    pub max_epochs:  usize,
    /// Optimizer steps taken so far
    pub global_step: usize,
    /// Batch index within the current stage
    pub batch_idx:   usize,
    /// Batches the current stage will run
    pub num_batches: usize,
    pub lr:          f64,
    /// Loss of the batch that just finished
    pub batch_loss:  Option<f64>,
    /// Everything logged so far this epoch (train/*, val/*, test/*)
    pub metrics:     MetricMap,
    /// fast_dev_run: nothing may be written to disk
    pub dry_run:     bool,
}

/// Action to take after a hook
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// Finish the current epoch, then stop fitting
    Stop,
}

/// Side channels a hook may use
pub struct CallbackEnv<'a> {
    pub logger: &'a mut dyn ExperimentLogger,
    pub model:  &'a dyn ModelSnapshot,
}

pub trait Callback {
    fn name(&self) -> &'static str;

    fn on_fit_start(&mut self, _ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<()> {
        Ok(())
    }

    fn on_epoch_start(&mut self, _ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<()> {
        Ok(())
    }

    fn on_stage_start(&mut self, _stage: Stage, _ctx: &CallbackContext) {}

    fn on_batch_end(&mut self, _stage: Stage, _ctx: &CallbackContext) {}

    fn on_stage_end(&mut self, _stage: Stage, _ctx: &CallbackContext) {}

    fn on_validation_end(
        &mut self,
        _ctx: &CallbackContext,
        _env: &mut CallbackEnv,
    ) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, _ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_fit_end(&mut self, _ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<()> {
        Ok(())
    }
}

// ─── CallbackList ─────────────────────────────────────────────────────────────
/// Runs hooks in registration order. A Stop from any callback
/// wins, but every callback still sees the event.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackList {
    pub fn new(callbacks: Vec<Box<dyn Callback>>) -> Self {
        Self { callbacks }
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<&'static str> {
        self.callbacks.iter().map(|c| c.name()).collect()
    }

    pub fn on_fit_start(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|c| c.on_fit_start(ctx, env))
    }

    pub fn on_epoch_start(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|c| c.on_epoch_start(ctx, env))
    }

    pub fn on_stage_start(&mut self, stage: Stage, ctx: &CallbackContext) {
        self.callbacks.iter_mut().for_each(|c| c.on_stage_start(stage, ctx));
    }

    pub fn on_batch_end(&mut self, stage: Stage, ctx: &CallbackContext) {
        self.callbacks.iter_mut().for_each(|c| c.on_batch_end(stage, ctx));
    }

    pub fn on_stage_end(&mut self, stage: Stage, ctx: &CallbackContext) {
        self.callbacks.iter_mut().for_each(|c| c.on_stage_end(stage, ctx));
    }

    pub fn on_validation_end(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<CallbackAction> {
        let mut action = CallbackAction::Continue;
        for callback in &mut self.callbacks {
            if callback.on_validation_end(ctx, env)? == CallbackAction::Stop {
                tracing::info!("{} requested stop", callback.name());
                action = CallbackAction::Stop;
            }
        }
        Ok(action)
    }

    pub fn on_epoch_end(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<CallbackAction> {
        let mut action = CallbackAction::Continue;
        for callback in &mut self.callbacks {
            if callback.on_epoch_end(ctx, env)? == CallbackAction::Stop {
                tracing::info!("{} requested stop", callback.name());
                action = CallbackAction::Stop;
            }
        }
        Ok(action)
    }

    pub fn on_fit_end(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|c| c.on_fit_end(ctx, env))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeModel, MemoryLogger};
    use super::*;

    struct StopAt(usize);

    impl Callback for StopAt {
        fn name(&self) -> &'static str {
            "StopAt"
        }

        fn on_epoch_end(&mut self, ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<CallbackAction> {
            Ok(if ctx.epoch >= self.0 { CallbackAction::Stop } else { CallbackAction::Continue })
        }
    }

    #[test]
    fn test_any_stop_wins() {
        let mut list = CallbackList::new(vec![Box::new(StopAt(10)), Box::new(StopAt(2))]);
        assert_eq!(list.names(), vec!["StopAt", "StopAt"]);

        let model      = FakeModel::default();
        let mut logger = MemoryLogger::default();
        let mut env    = CallbackEnv { logger: &mut logger, model: &model };

        let ctx = CallbackContext { epoch: 1, ..Default::default() };
        assert_eq!(list.on_epoch_end(&ctx, &mut env).unwrap(), CallbackAction::Continue);

        let ctx = CallbackContext { epoch: 2, ..Default::default() };
        assert_eq!(list.on_epoch_end(&ctx, &mut env).unwrap(), CallbackAction::Stop);
    }
}
