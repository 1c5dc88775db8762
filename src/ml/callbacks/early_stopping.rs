// ============================================================
// Layer 5 — Early Stopping
// ============================================================
// Watches one validation metric and stops fitting after
// `patience` consecutive validation checks without an
// improvement larger than `min_delta`.
//
//   max mode: improved ⇔ current - best > min_delta
//   min mode: improved ⇔ best - current > min_delta
//
// A NaN or infinite value stops immediately.

use anyhow::{bail, Result};

use crate::domain::monitor::MonitorMode;
use crate::ml::callbacks::{Callback, CallbackAction, CallbackContext, CallbackEnv};

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor:       String,
    mode:          MonitorMode,
    min_delta:     f64,
    patience:      usize,
    verbose:       bool,
    best:          f64,
    wait:          usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, mode: MonitorMode, min_delta: f64, patience: usize) -> Self {
        Self {
            monitor: monitor.into(),
            mode,
            min_delta: min_delta.abs(),
            patience,
            verbose: false,
            best: mode.worst(),
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[cfg(test)]
    pub fn best(&self) -> f64 {
        self.best
    }

    #[cfg(test)]
    pub fn wait_count(&self) -> usize {
        self.wait
    }

    #[cfg(test)]
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    /// Feed one validation result
    pub fn check(&mut self, current: f64, epoch: usize) -> CallbackAction {
        if !current.is_finite() {
            tracing::warn!("Monitored metric {} = {} is not finite. Stopping.", self.monitor, current);
            self.stopped_epoch = Some(epoch);
            return CallbackAction::Stop;
        }

        if self.mode.is_improvement(current, self.best, self.min_delta) {
            if self.verbose {
                tracing::info!("Metric {} improved to {:.4} (previous best {:.4})", self.monitor, current, self.best);
            }
            self.best = current;
            self.wait = 0;
            return CallbackAction::Continue;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch = Some(epoch);
            if self.verbose {
                tracing::info!(
                    "Monitored metric {} did not improve in the last {} checks. Best score: {:.4}. Stopping.",
                    self.monitor, self.wait, self.best
                );
            }
            return CallbackAction::Stop;
        }
        CallbackAction::Continue
    }
}

impl Callback for EarlyStopping {
    fn name(&self) -> &'static str {
        "EarlyStopping"
    }

    fn on_validation_end(&mut self, ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<CallbackAction> {
        if ctx.dry_run {
            return Ok(CallbackAction::Continue);
        }
        let Some(&current) = ctx.metrics.get(&self.monitor) else {
            let available: Vec<&str> = ctx.metrics.keys().map(String::as_str).collect();
            bail!(
                "Early stopping conditioned on metric '{}' which is not available. Available metrics: {}",
                self.monitor,
                available.join(", ")
            );
        };
        Ok(self.check(current, ctx.epoch))
    }
}
