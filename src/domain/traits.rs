// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data module and the driver only ever talk to these
// traits, so a new dataset or a different run tracker can be
// added without touching the orchestration code.

use std::path::Path;

use anyhow::Result;

use crate::domain::image::{ImageCollection, Split};

// ─── DatasetProvider ──────────────────────────────────────────────────────────
/// A labeled-image dataset that can be cached locally and read back.
///
/// Implementations:
///   - Cifar10  → cifar-10-batches-bin/*.bin
///   - Cifar100 → cifar-100-binary/{train,test}.bin
///   - Mnist    → MNIST/raw/*-ubyte.gz
pub trait DatasetProvider: Send + Sync {
    /// Registry name, e.g. "CIFAR10"
    fn name(&self) -> &'static str;

    /// Channel count of the decoded images
    fn channels(&self) -> usize;

    /// Number of distinct labels
    fn num_classes(&self) -> usize;

    /// True when every file needed for `split` exists under `root`
    fn is_cached(&self, root: &Path, split: Split) -> bool;

    /// Fetch whatever is missing for `split` into `root`.
    /// Must be a no-op when `is_cached` already holds.
    fn download(&self, root: &Path, split: Split) -> Result<()>;

    /// Decode all images of `split` in stored order
    fn load(&self, root: &Path, split: Split) -> Result<ImageCollection>;
}

// ─── ModelSnapshot ────────────────────────────────────────────────────────────
/// Something that can write the current model weights to disk.
/// Callbacks receive this instead of the model itself, so they
/// stay independent of the backend and model types.
pub trait ModelSnapshot {
    /// Save to `path` and return the path actually written
    fn save(&self, path: &Path) -> Result<std::path::PathBuf>;
}
