// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by more than one layer:
//
//   checkpoint.rs — checkpoint directory, Burn CompactRecorder
//                   save/load, filename templates and the
//                   checkpoints.json index
//
//   tracker.rs    — offline experiment tracker: run directory
//                   with hyperparameters, metric stream, watch
//                   statistics and artifacts
//
//   seed.rs       — one run seed fanned out to Burn and the
//                   data pipeline
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Run tracking on the local filesystem
pub mod tracker;

/// Seeding of every random source
pub mod seed;
