// ============================================================
// Layer 6 — Checkpoint Storage
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder
// and keeps a small JSON index of what was written.
//
// Directory layout:
//   <default_root_dir>/<experiment_name>/ckpt/
//     [epoch=3]-[step=2500]-[val_acc=0.53].mpk   ← top-k by monitor
//     ...
//     last.mpk                                   ← most recent epoch
//     checkpoints.json                           ← index below
//
// checkpoints.json:
//   best_model_path, best_model_score  → the top-ranked file
//   best_k_models                      → every kept file + score
//   last_model_path                    → last.mpk once written
//
// The recorder derives the file extension itself, replacing
// whatever follows the last '.', so paths handed to it always
// end in ".mpk" already.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::{prelude::*, record::CompactRecorder};
use serde::{Deserialize, Serialize};

use crate::domain::{monitor::MonitorMode, traits::ModelSnapshot};
use crate::ml::metrics::MetricMap;

pub const CHECKPOINT_EXT: &str = "mpk";

pub const LAST_NAME: &str = "last";

pub const INDEX_FILE: &str = "checkpoints.json";

// ─── Directory ────────────────────────────────────────────────────────────────
/// Create the checkpoint directory if it does not exist yet.
/// Calling it again on an existing directory is a no-op.
pub fn make_checkpoint_dir(log_save_dir: &Path) -> Result<PathBuf> {
    if !log_save_dir.is_dir() {
        fs::create_dir_all(log_save_dir).with_context(|| {
            format!("Cannot create checkpoint directory '{}'", log_save_dir.display())
        })?;
        tracing::info!("Created checkpoint directory '{}'", log_save_dir.display());
    }
    Ok(log_save_dir.to_path_buf())
}

/// `<dir>/<name>.mpk`
pub fn checkpoint_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{CHECKPOINT_EXT}"))
}

// ─── Filename template ────────────────────────────────────────────────────────
/// Expand `{name}` and `{name:.Nf}` groups into `name=value`.
///
/// Metrics missing from `metrics` are written as 0. A '/' in a
/// metric name becomes '_' so the result is a single file name.
pub fn format_checkpoint_name(template: &str, metrics: &MetricMap) -> String {
    let mut out  = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };

        let group = &after[..close];
        let (name, spec) = match group.split_once(':') {
            Some((name, spec)) => (name, Some(spec)),
            None               => (group, None),
        };
        let value = metrics.get(name).copied().unwrap_or(0.0);
        out.push_str(&format!("{}={}", name.replace('/', "_"), format_value(value, spec)));

        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

fn format_value(value: f64, spec: Option<&str>) -> String {
    let precision = spec
        .and_then(|s| s.strip_prefix('.'))
        .and_then(|s| s.strip_suffix('f'))
        .and_then(|p| p.parse::<usize>().ok());

    match precision {
        Some(p) => format!("{value:.p$}"),
        None if value.is_finite() && value.fract() == 0.0 => format!("{}", value as i64),
        None => format!("{value}"),
    }
}

// ─── Save / load ──────────────────────────────────────────────────────────────
/// Write `model` to `path` (which should end in ".mpk").
pub fn save_model<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<PathBuf> {
    model
        .clone()
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

    tracing::debug!("Saved checkpoint '{}'", path.display());
    Ok(path.with_extension(CHECKPOINT_EXT))
}

/// Restore weights saved by `save_model` into a model of the same architecture.
pub fn load_model<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
    if !path.is_file() {
        bail!("Checkpoint '{}' does not exist", path.display());
    }
    let model = model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .with_context(|| {
            format!("Cannot load checkpoint '{}'. Does the model architecture match?", path.display())
        })?;

    tracing::info!("Loaded checkpoint '{}'", path.display());
    Ok(model)
}

/// Borrowed module that callbacks can save without knowing its type
pub struct ModuleSnapshot<'a, B: Backend, M: Module<B>> {
    module:  &'a M,
    backend: PhantomData<B>,
}

impl<'a, B: Backend, M: Module<B>> ModuleSnapshot<'a, B, M> {
    pub fn new(module: &'a M) -> Self {
        Self { module, backend: PhantomData }
    }
}

impl<B: Backend, M: Module<B>> ModelSnapshot for ModuleSnapshot<'_, B, M> {
    fn save(&self, path: &Path) -> Result<PathBuf> {
        save_model::<B, M>(self.module, path)
    }
}

// ─── Index ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCheckpoint {
    pub path:  PathBuf,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub monitor:          Option<String>,
    pub mode:             Option<MonitorMode>,
    pub best_model_path:  Option<PathBuf>,
    pub best_model_score: Option<f64>,
    pub best_k_models:    Vec<RankedCheckpoint>,
    pub last_model_path:  Option<PathBuf>,
}

impl CheckpointIndex {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read '{}'. Has a training run finished an epoch?", path.display())
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(INDEX_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }
}

/// Resolve `--ckpt-path`: "best" and "last" go through the index
/// in `dir`, anything else is taken as a file path.
pub fn resolve_checkpoint(dir: &Path, which: &str) -> Result<PathBuf> {
    let resolved = match which {
        "best" => CheckpointIndex::load(dir)?
            .best_model_path
            .context("No best checkpoint recorded yet")?,
        "last" => CheckpointIndex::load(dir)?
            .last_model_path
            .context("No last checkpoint recorded yet")?,
        other => PathBuf::from(other),
    };

    if !resolved.is_file() {
        bail!("Checkpoint '{}' does not exist", resolved.display());
    }
    Ok(resolved)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        nn::{Linear, LinearConfig},
    };

    type TestBackend = NdArray<f32>;

    fn metrics(pairs: &[(&str, f64)]) -> MetricMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_make_checkpoint_dir_creates_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir  = root.path().join("exp").join("ckpt");

        let made = make_checkpoint_dir(&dir).unwrap();
        assert_eq!(made, dir);
        assert!(dir.is_dir());

        fs::write(dir.join("keep.txt"), "x").unwrap();
        make_checkpoint_dir(&dir).unwrap();
        assert!(dir.join("keep.txt").is_file());
    }

    #[test]
    fn test_format_default_template() {
        let m = metrics(&[("epoch", 3.0), ("step", 2500.0), ("val/acc", 0.5349)]);
        assert_eq!(
            format_checkpoint_name("[{epoch}]-[{step}]-[{val/acc:.2f}]", &m),
            "[epoch=3]-[step=2500]-[val_acc=0.53]"
        );
    }

    #[test]
    fn test_format_missing_metric_and_plain_text() {
        let m = metrics(&[("epoch", 0.0)]);
        assert_eq!(format_checkpoint_name("model-{epoch}-{val/loss:.3f}", &m), "model-epoch=0-val_loss=0.000");
        assert_eq!(format_checkpoint_name("plain", &m), "plain");
        assert_eq!(format_checkpoint_name("open-{epoch", &m), "open-{epoch");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(4, 2).init(&device);
        let path   = checkpoint_path(dir.path(), "[epoch=1]-[val_acc=0.53]");

        let written = ModuleSnapshot::<TestBackend, _>::new(&model).save(&path).unwrap();
        assert_eq!(written, path);
        assert!(path.is_file());

        let fresh: Linear<TestBackend> = LinearConfig::new(4, 2).init(&device);
        let loaded = load_model(fresh, &path, &device).unwrap();
        let a: Vec<f32> = model.weight.val().into_data().iter::<f32>().collect();
        let b: Vec<f32> = loaded.weight.val().into_data().iter::<f32>().collect();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_resolve_best_and_last() {
        let dir  = tempfile::tempdir().unwrap();
        let best = dir.path().join("best.mpk");
        let last = dir.path().join("last.mpk");
        fs::write(&best, b"b").unwrap();
        fs::write(&last, b"l").unwrap();

        let index = CheckpointIndex {
            best_model_path: Some(best.clone()),
            last_model_path: Some(last.clone()),
            ..Default::default()
        };
        index.save(dir.path()).unwrap();
        assert_eq!(CheckpointIndex::load(dir.path()).unwrap(), index);

        assert_eq!(resolve_checkpoint(dir.path(), "best").unwrap(), best);
        assert_eq!(resolve_checkpoint(dir.path(), "last").unwrap(), last);
        assert!(resolve_checkpoint(dir.path(), "missing.mpk").is_err());
    }
}
