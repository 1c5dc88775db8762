// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from dataset files on disk
// all the way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   remote archive / idx files
//       │
//       ▼
//   download          → fetches and unpacks into the cache dir
//       │
//       ▼
//   Cifar10 / Mnist   → decode records into labeled images
//       │
//       ▼
//   Compose           → resize, flips, to-tensor, normalize
//       │
//       ▼
//   Subset            → 80/20 train/validation views (Burn Dataset)
//       │
//       ▼
//   ImageBatcher      → stacks samples into tensor batches
//       │
//       ▼
//   DataModule        → owns all of the above, hands out DataLoaders
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// HTTP download and archive extraction
pub mod download;

/// CIFAR-10 / CIFAR-100 binary format
pub mod cifar;

/// MNIST idx format
pub mod mnist;

/// Typed image transform pipelines
pub mod transforms;

/// Implements Burn's Dataset trait for transformed images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;

/// Prepare / setup / loaders for one dataset
pub mod datamodule;
