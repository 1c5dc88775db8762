// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, trains or evaluates a network.
//
//   classifier.rs — ImageClassifier trait + weight init helpers
//   vgg.rs        — VGG 11/13/16/19, optional batch-norm
//   alexnet.rs    — AlexNet sized for small images
//   metrics.rs    — batch-weighted loss/accuracy, tensor stats
//   optim.rs      — SGD settings → Burn SgdConfig
//   callbacks/    — progress, LR monitor, early stop, checkpoint
//   trainer.rs    — generic fit / test loop
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Model abstraction shared by every architecture
pub mod classifier;

/// VGG architectures
pub mod vgg;

/// Small-image AlexNet
pub mod alexnet;

/// Epoch metrics and parameter statistics
pub mod metrics;

/// SGD optimizer settings
pub mod optim;

/// Hooks run by the trainer
pub mod callbacks;

/// Fit and test loops
pub mod trainer;
