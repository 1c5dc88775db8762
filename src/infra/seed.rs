// ============================================================
// Layer 6 — Seeding
// ============================================================
// One run seed fans out into every source of randomness:
//
//   B::seed(seed)          → Burn's parameter init + dropout
//   StdRng(seed)           → returned to the caller, which draws
//                            child seeds for the split, the
//                            augmentation RNG and the shuffle
//
// Nothing else in the crate reads a global RNG.

use burn::prelude::Backend;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::datamodule::DataSeeds;

pub fn seed_everything<B: Backend>(seed: u64) -> StdRng {
    B::seed(seed);
    tracing::info!("Global seed set to {}", seed);
    StdRng::seed_from_u64(seed)
}

/// Draw independent seeds for the data pipeline
pub fn data_seeds<R: Rng + ?Sized>(rng: &mut R) -> DataSeeds {
    DataSeeds {
        split:   rng.gen(),
        augment: rng.gen(),
        shuffle: rng.gen(),
    }
}
