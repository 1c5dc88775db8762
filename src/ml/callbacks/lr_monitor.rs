// ============================================================
// Layer 5 — Learning Rate Monitor
// ============================================================
// Logs the optimizer's learning rate as "lr-<optimizer>" at the
// start of every training epoch.

use anyhow::Result;

use crate::ml::callbacks::{Callback, CallbackContext, CallbackEnv};
use crate::ml::metrics::MetricMap;

#[derive(Debug, Clone)]
pub struct LearningRateMonitor {
    key: String,
}

impl LearningRateMonitor {
    pub fn new(optimizer_name: &str) -> Self {
        Self { key: format!("lr-{optimizer_name}") }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Callback for LearningRateMonitor {
    fn name(&self) -> &'static str {
        "LearningRateMonitor"
    }

    fn on_epoch_start(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<()> {
        if ctx.dry_run {
            return Ok(());
        }
        let mut metrics = MetricMap::new();
        metrics.insert(self.key.clone(), ctx.lr);
        env.logger.log_metrics(&metrics, ctx.global_step)
    }
}
