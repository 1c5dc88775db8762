// ============================================================
// Layer 6 — Experiment Tracker
// ============================================================
// An offline run tracker. Every run gets its own directory:
//
//   <save_dir>/runs/<project>-<run_id>/
//     hparams.json     ← resolved configuration
//     metrics.jsonl    ← one line per log_metrics call
//     watch.jsonl      ← parameter / gradient statistics
//     artifacts.jsonl  ← checkpoint files handed to the run
//     artifacts/       ← copies of those files (log_model only)
//     summary.json     ← last value of every metric + status
//
// JSON Lines keeps every write an append, so a crashed run
// still leaves a readable history behind.
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ml::metrics::{MetricMap, ParamStats};

// ─── Types ────────────────────────────────────────────────────────────────────
/// What `watch` records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    Gradients,
    Parameters,
    All,
}

impl WatchMode {
    pub fn values(self) -> bool {
        matches!(self, Self::Parameters | Self::All)
    }

    pub fn gradients(self) -> bool {
        matches!(self, Self::Gradients | Self::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Finished,
    Failed,
}

/// Sink for everything a run produces besides checkpoints
pub trait ExperimentLogger {
    fn run_dir(&self) -> &Path;

    fn log_hyperparams(&mut self, params: &serde_json::Value) -> Result<()>;

    fn log_metrics(&mut self, metrics: &MetricMap, step: usize) -> Result<()>;

    /// Start recording parameter statistics every `log_freq` steps
    fn watch(&mut self, mode: WatchMode, log_freq: usize);

    fn unwatch(&mut self);

    /// Current mode and frequency, if watching
    fn watching(&self) -> Option<(WatchMode, usize)>;

    fn log_parameter_stats(&mut self, stats: &[ParamStats], step: usize) -> Result<()>;

    /// Hand a file (usually a checkpoint) to the run
    fn log_artifact(&mut self, path: &Path, aliases: &[String]) -> Result<()>;

    fn finalize(&mut self, status: RunStatus) -> Result<()>;
}

// ─── LocalTracker ─────────────────────────────────────────────────────────────
pub struct LocalTracker {
    project:    String,
    run_id:     String,
    run_dir:    PathBuf,
    log_model:  bool,
    watch:      Option<(WatchMode, usize)>,
    latest:     BTreeMap<String, f64>,
    started_at: DateTime<Local>,
    finalized:  bool,
}

impl LocalTracker {
    /// Create a fresh run directory under `<save_dir>/runs/`.
    /// With `log_model` set, logged artifacts are copied into the run.
    pub fn new(save_dir: &Path, project: &str, log_model: bool) -> Result<Self> {
        let started_at = Local::now();
        let short_id   = uuid::Uuid::new_v4().simple().to_string();
        let run_id     = format!("{}-{}", started_at.format("%Y%m%d_%H%M%S"), &short_id[..8]);
        let run_dir    = save_dir.join("runs").join(format!("{project}-{run_id}"));

        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Cannot create run directory '{}'", run_dir.display()))?;

        tracing::info!("Tracking run '{}' in '{}'", run_id, run_dir.display());

        Ok(Self {
            project: project.to_string(),
            run_id,
            run_dir,
            log_model,
            watch: None,
            latest: BTreeMap::new(),
            started_at,
            finalized: false,
        })
    }

    fn append_line(&self, file: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.run_dir.join(file);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;
        writeln!(f, "{}", serde_json::to_string(value)?)?;
        Ok(())
    }
}

impl ExperimentLogger for LocalTracker {
    fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn log_hyperparams(&mut self, params: &serde_json::Value) -> Result<()> {
        let path = self.run_dir.join("hparams.json");
        fs::write(&path, serde_json::to_string_pretty(params)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Logged hyperparameters to '{}'", path.display());
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &MetricMap, step: usize) -> Result<()> {
        let mut line = serde_json::Map::new();
        line.insert("step".into(), json!(step));
        line.insert("timestamp".into(), json!(Local::now().to_rfc3339()));
        for (name, value) in metrics {
            line.insert(name.clone(), json!(value));
            self.latest.insert(name.clone(), *value);
        }
        self.append_line("metrics.jsonl", &serde_json::Value::Object(line))
    }

    fn watch(&mut self, mode: WatchMode, log_freq: usize) {
        tracing::debug!("Watching parameters: {:?} every {} steps", mode, log_freq);
        self.watch = Some((mode, log_freq.max(1)));
    }

    fn unwatch(&mut self) {
        if self.watch.take().is_some() {
            tracing::debug!("Stopped watching parameters");
        }
    }

    fn watching(&self) -> Option<(WatchMode, usize)> {
        self.watch
    }

    fn log_parameter_stats(&mut self, stats: &[ParamStats], step: usize) -> Result<()> {
        if self.watch.is_none() {
            return Ok(());
        }
        self.append_line("watch.jsonl", &json!({ "step": step, "parameters": stats }))
    }

    fn log_artifact(&mut self, path: &Path, aliases: &[String]) -> Result<()> {
        if !self.log_model {
            return Ok(());
        }

        let file_name = path
            .file_name()
            .with_context(|| format!("Artifact '{}' has no file name", path.display()))?;
        let artifacts = self.run_dir.join("artifacts");
        fs::create_dir_all(&artifacts)?;

        let dest = artifacts.join(file_name);
        fs::copy(path, &dest)
            .with_context(|| format!("Cannot copy artifact '{}'", path.display()))?;

        self.append_line(
            "artifacts.jsonl",
            &json!({
                "file":    dest.file_name().map(|f| f.to_string_lossy().to_string()),
                "source":  path.display().to_string(),
                "aliases": aliases,
            }),
        )
    }

    fn finalize(&mut self, status: RunStatus) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let summary = json!({
            "project":     self.project,
            "run_id":      self.run_id,
            "status":      status,
            "started_at":  self.started_at.to_rfc3339(),
            "finished_at": Local::now().to_rfc3339(),
            "summary":     self.latest,
        });
        let path = self.run_dir.join("summary.json");
        fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        tracing::info!("Run '{}' {:?}", self.run_id, status);
        Ok(())
    }
}
