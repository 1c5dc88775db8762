// ============================================================
// Layer 5 — Model Checkpoint
// ============================================================
// After every validation run:
//
//   1. score = metrics[monitor]   (NaN ranks as the worst value)
//   2. if fewer than top_k kept, or score beats the worst kept:
//        save "<filename template>.mpk", evict + delete the worst
//   3. if save_last: overwrite last.mpk
//   4. rewrite checkpoints.json
//
// Saved files are also handed to the tracker as artifacts.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};

use crate::domain::monitor::MonitorMode;
use crate::infra::checkpoint::{
    checkpoint_path, format_checkpoint_name, CheckpointIndex, RankedCheckpoint, LAST_NAME,
};
use crate::ml::callbacks::{Callback, CallbackAction, CallbackContext, CallbackEnv};

pub const DEFAULT_FILENAME: &str = "[{epoch}]-[{step}]-[{val/acc:.2f}]";

#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    dirpath:    PathBuf,
    filename:   String,
    monitor:    String,
    mode:       MonitorMode,
    save_top_k: usize,
    save_last:  bool,
    verbose:    bool,
    best_k:     Vec<RankedCheckpoint>,
    last_path:  Option<PathBuf>,
}

impl ModelCheckpoint {
    pub fn new(dirpath: impl Into<PathBuf>, monitor: impl Into<String>, mode: MonitorMode) -> Self {
        Self {
            dirpath:    dirpath.into(),
            filename:   DEFAULT_FILENAME.to_string(),
            monitor:    monitor.into(),
            mode,
            save_top_k: 1,
            save_last:  false,
            verbose:    false,
            best_k:     Vec::new(),
            last_path:  None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_save_top_k(mut self, k: usize) -> Self {
        self.save_top_k = k;
        self
    }

    pub fn with_save_last(mut self, save_last: bool) -> Self {
        self.save_last = save_last;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Kept checkpoints, best first
    #[cfg(test)]
    pub fn best_k_models(&self) -> &[RankedCheckpoint] {
        &self.best_k
    }

    pub fn best_model_path(&self) -> Option<&Path> {
        self.best_k.first().map(|c| c.path.as_path())
    }

    #[cfg(test)]
    pub fn last_model_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    pub fn index(&self) -> CheckpointIndex {
        CheckpointIndex {
            monitor:          Some(self.monitor.clone()),
            mode:             Some(self.mode),
            best_model_path:  self.best_k.first().map(|c| c.path.clone()),
            best_model_score: self.best_k.first().map(|c| c.score),
            best_k_models:    self.best_k.clone(),
            last_model_path:  self.last_path.clone(),
        }
    }

    fn qualifies(&self, score: f64) -> bool {
        if self.save_top_k == 0 {
            return false;
        }
        if self.best_k.len() < self.save_top_k {
            return true;
        }
        self.best_k
            .last()
            .is_some_and(|worst| self.mode.is_better(score, worst.score))
    }

    /// Append -v1, -v2, ... when a stale file already has this name
    fn unique_path(&self, name: &str) -> PathBuf {
        let mut path    = checkpoint_path(&self.dirpath, name);
        let mut version = 1;
        while path.exists() && !self.best_k.iter().any(|c| c.path == path) {
            path = checkpoint_path(&self.dirpath, &format!("{name}-v{version}"));
            version += 1;
        }
        path
    }

    fn sort_best_first(&mut self) {
        let mode = self.mode;
        self.best_k.sort_by(|a, b| match mode {
            MonitorMode::Max => b.score.total_cmp(&a.score),
            MonitorMode::Min => a.score.total_cmp(&b.score),
        });
    }

    fn save_ranked(&mut self, score: f64, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<()> {
        let mut metrics = ctx.metrics.clone();
        metrics.insert("epoch".into(), ctx.epoch as f64);
        metrics.insert("step".into(), ctx.global_step as f64);

        let name = format_checkpoint_name(&self.filename, &metrics);
        let path = self.unique_path(&name);
        let path = env.model.save(&path)?;

        self.best_k.retain(|c| c.path != path);
        self.best_k.push(RankedCheckpoint { path: path.clone(), score });
        self.sort_best_first();

        if self.best_k.len() > self.save_top_k {
            if let Some(evicted) = self.best_k.pop() {
                if evicted.path != path && evicted.path.is_file() {
                    fs::remove_file(&evicted.path)?;
                    tracing::debug!("Removed checkpoint '{}'", evicted.path.display());
                }
            }
        }

        if self.verbose {
            tracing::info!(
                "Epoch {}, global step {}: {} reached {:.5}, saving '{}' as top {}",
                ctx.epoch, ctx.global_step, self.monitor, score, path.display(), self.save_top_k
            );
        }

        let aliases = if self.best_model_path() == Some(path.as_path()) {
            vec!["best".to_string()]
        } else {
            Vec::new()
        };
        env.logger.log_artifact(&path, &aliases)
    }
}

impl Callback for ModelCheckpoint {
    fn name(&self) -> &'static str {
        "ModelCheckpoint"
    }

    fn on_fit_start(&mut self, _ctx: &CallbackContext, _env: &mut CallbackEnv) -> Result<()> {
        fs::create_dir_all(&self.dirpath)?;
        Ok(())
    }

    fn on_validation_end(&mut self, ctx: &CallbackContext, env: &mut CallbackEnv) -> Result<CallbackAction> {
        if ctx.dry_run {
            return Ok(CallbackAction::Continue);
        }

        let Some(&raw) = ctx.metrics.get(&self.monitor) else {
            bail!(
                "ModelCheckpoint(monitor='{}') could not find the monitored key in the logged metrics",
                self.monitor
            );
        };
        let score = if raw.is_finite() { raw } else { self.mode.worst() };

        if self.qualifies(score) {
            self.save_ranked(score, ctx, env)?;
        } else if self.verbose {
            tracing::info!(
                "Epoch {}, global step {}: {} was not in top {}",
                ctx.epoch, ctx.global_step, self.monitor, self.save_top_k
            );
        }

        if self.save_last {
            let last = env.model.save(&checkpoint_path(&self.dirpath, LAST_NAME))?;
            env.logger.log_artifact(&last, &["latest".to_string()])?;
            self.last_path = Some(last);
        }

        self.index().save(&self.dirpath)?;
        Ok(CallbackAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::callbacks::testing::{FakeModel, MemoryLogger};

    fn validate(cb: &mut ModelCheckpoint, epoch: usize, acc: f64, logger: &mut MemoryLogger) {
        let model   = FakeModel::default();
        let mut env = CallbackEnv { logger, model: &model };
        let mut ctx = CallbackContext { epoch, global_step: (epoch + 1) * 100, ..Default::default() };
        ctx.metrics.insert("val/acc".into(), acc);
        cb.on_validation_end(&ctx, &mut env).unwrap();
    }

    fn mpk_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".mpk"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_keeps_top_k_and_last() {
        let dir        = tempfile::tempdir().unwrap();
        let mut logger = MemoryLogger::default();
        let mut cb     = ModelCheckpoint::new(dir.path(), "val/acc", MonitorMode::Max)
            .with_save_top_k(2)
            .with_save_last(true);

        for (epoch, acc) in [0.10, 0.40, 0.20, 0.50].into_iter().enumerate() {
            validate(&mut cb, epoch, acc, &mut logger);
        }

        let scores: Vec<f64> = cb.best_k_models().iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.50, 0.40]);
        assert_eq!(
            mpk_files(dir.path()),
            vec![
                "[epoch=1]-[step=200]-[val_acc=0.40].mpk".to_string(),
                "[epoch=3]-[step=400]-[val_acc=0.50].mpk".to_string(),
                "last.mpk".to_string(),
            ]
        );

        let index = CheckpointIndex::load(dir.path()).unwrap();
        assert_eq!(index.best_model_score, Some(0.50));
        assert_eq!(index.best_model_path.as_deref(), cb.best_model_path());
        assert_eq!(index.last_model_path, Some(dir.path().join("last.mpk")));
        assert_eq!(index.best_k_models.len(), 2);
    }

    #[test]
    fn test_min_mode_ranking() {
        let dir        = tempfile::tempdir().unwrap();
        let mut logger = MemoryLogger::default();
        let mut cb     = ModelCheckpoint::new(dir.path(), "val/acc", MonitorMode::Min)
            .with_filename("{epoch}")
            .with_save_top_k(1);

        validate(&mut cb, 0, 0.5, &mut logger);
        validate(&mut cb, 1, 0.7, &mut logger);
        validate(&mut cb, 2, 0.3, &mut logger);

        assert_eq!(cb.best_model_path(), Some(dir.path().join("epoch=2.mpk").as_path()));
        assert_eq!(mpk_files(dir.path()), vec!["epoch=2.mpk".to_string()]);
        assert!(cb.last_model_path().is_none());
    }

    #[test]
    fn test_artifacts_logged_with_aliases() {
        let dir        = tempfile::tempdir().unwrap();
        let mut logger = MemoryLogger::default();
        let mut cb     = ModelCheckpoint::new(dir.path(), "val/acc", MonitorMode::Max)
            .with_save_top_k(5)
            .with_save_last(true);

        validate(&mut cb, 0, 0.5, &mut logger);
        validate(&mut cb, 1, 0.4, &mut logger);

        let aliases: Vec<Vec<String>> = logger.artifacts.iter().map(|(_, a)| a.clone()).collect();
        assert_eq!(aliases[0], vec!["best".to_string()]);
        assert_eq!(aliases[1], vec!["latest".to_string()]);
        assert!(aliases[2].is_empty());
    }

    #[test]
    fn test_stale_file_gets_version_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("epoch=0.mpk"), b"old run").unwrap();

        let mut logger = MemoryLogger::default();
        let mut cb     = ModelCheckpoint::new(dir.path(), "val/acc", MonitorMode::Max)
            .with_filename("{epoch}")
            .with_save_top_k(3);
        validate(&mut cb, 0, 0.5, &mut logger);

        assert_eq!(cb.best_model_path(), Some(dir.path().join("epoch=0-v1.mpk").as_path()));
        assert_eq!(fs::read(dir.path().join("epoch=0.mpk")).unwrap(), b"old run");
    }

    #[test]
    fn test_missing_monitor_is_error() {
        let dir        = tempfile::tempdir().unwrap();
        let mut logger = MemoryLogger::default();
        let model      = FakeModel::default();
        let mut env    = CallbackEnv { logger: &mut logger, model: &model };
        let mut cb     = ModelCheckpoint::new(dir.path(), "val/acc", MonitorMode::Max);

        assert!(cb.on_validation_end(&CallbackContext::default(), &mut env).is_err());
    }
}
