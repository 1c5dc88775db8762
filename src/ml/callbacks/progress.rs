// ============================================================
// Layer 5 — Progress Bar
// ============================================================
// One indicatif bar per stage, redrawn every `refresh_rate`
// batches and on the last batch. The training bar stays on
// screen after the epoch; validation and test bars are cleared.

use indicatif::{ProgressBar as Bar, ProgressStyle};

use crate::domain::stage::Stage;
use crate::ml::callbacks::{Callback, CallbackContext};

pub const DEFAULT_REFRESH_RATE: usize = 5;

pub struct ProgressBar {
    refresh_rate: usize,
    bar:          Option<Bar>,
}

impl ProgressBar {
    pub fn new(refresh_rate: usize) -> Self {
        Self { refresh_rate: refresh_rate.max(1), bar: None }
    }

    /// True when the bar is redrawn after batch `batch_idx`
    pub fn should_refresh(&self, batch_idx: usize, num_batches: usize) -> bool {
        let done = batch_idx + 1;
        done % self.refresh_rate == 0 || done == num_batches
    }

    fn description(stage: Stage, ctx: &CallbackContext) -> String {
        match stage {
            Stage::Fit => format!("Epoch {}/{}", ctx.epoch + 1, ctx.max_epochs),
            Stage::Validate => "Validation".to_string(),
            Stage::Test => "Testing".to_string(),
            Stage::Predict => "Predicting".to_string(),
        }
    }

    fn message(ctx: &CallbackContext) -> String {
        let mut parts = Vec::new();
        if let Some(loss) = ctx.batch_loss {
            parts.push(format!("loss={loss:.4}"));
        }
        parts.extend(ctx.metrics.iter().map(|(k, v)| format!("{k}={v:.4}")));
        parts.join(" ")
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_RATE)
    }
}

impl Callback for ProgressBar {
    fn name(&self) -> &'static str {
        "ProgressBar"
    }

    fn on_stage_start(&mut self, stage: Stage, ctx: &CallbackContext) {
        let bar = Bar::new(ctx.num_batches as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(Self::description(stage, ctx));
        self.bar = Some(bar);
    }

    fn on_batch_end(&mut self, _stage: Stage, ctx: &CallbackContext) {
        if !self.should_refresh(ctx.batch_idx, ctx.num_batches) {
            return;
        }
        if let Some(bar) = &self.bar {
            bar.set_position((ctx.batch_idx + 1) as u64);
            bar.set_message(Self::message(ctx));
        }
    }

    fn on_stage_end(&mut self, stage: Stage, ctx: &CallbackContext) {
        if let Some(bar) = self.bar.take() {
            match stage {
                Stage::Fit => bar.finish_with_message(Self::message(ctx)),
                _          => bar.finish_and_clear(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_every_n_and_last() {
        let progress = ProgressBar::new(5);
        let refreshed: Vec<usize> = (0..12).filter(|&i| progress.should_refresh(i, 12)).collect();
        assert_eq!(refreshed, vec![4, 9, 11]);
    }

    #[test]
    fn test_stage_lifecycle_and_message() {
        let mut progress = ProgressBar::default();
        let mut ctx = CallbackContext { max_epochs: 3, num_batches: 10, ..Default::default() };

        progress.on_stage_start(Stage::Fit, &ctx);
        assert!(progress.bar.is_some());

        ctx.batch_idx  = 4;
        ctx.batch_loss = Some(1.23456);
        progress.on_batch_end(Stage::Fit, &ctx);
        assert_eq!(progress.bar.as_ref().unwrap().position(), 5);
        assert_eq!(ProgressBar::message(&ctx), "loss=1.2346");

        progress.on_stage_end(Stage::Fit, &ctx);
        assert!(progress.bar.is_none());
        assert_eq!(ProgressBar::description(Stage::Fit, &ctx), "Epoch 1/3");
    }
}
