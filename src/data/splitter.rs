// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Randomly permutes item indices and cuts them into two sets:
//   - Training set:   first floor(n * fraction) indices
//   - Validation set: the remainder
//
// The permutation comes from the generator passed in, so the
// same seed always yields the same partition and nothing is
// written to disk.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::{seq::SliceRandom, Rng};

/// Fraction of the training collection kept for training
pub const TRAIN_FRACTION: f64 = 0.8;

/// Number of training items for a collection of `total` items.
pub fn train_size(total: usize, train_fraction: f64) -> usize {
    ((total as f64) * train_fraction).floor().min(total as f64) as usize
}

/// Randomly shuffle `samples` and split into (train, validation).
///
/// # Arguments
/// * `samples`        - All available samples (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.8 = 80%
/// * `rng`            - Source of the permutation
pub fn split_train_val<T, R: Rng + ?Sized>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = train_size(total, train_fraction);

    // samples = [0..split_at], val = [split_at..total]
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

/// Split the indices `0..total` the same way as `split_train_val`.
pub fn random_split_indices<R: Rng + ?Sized>(
    total:          usize,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<usize>, Vec<usize>) {
    split_train_val((0..total).collect(), train_fraction, rng)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, &mut StdRng::seed_from_u64(1));
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_floor_rounding() {
        // 0.8 * 7 = 5.6 → 5 train, 2 validation
        let (train, val) = random_split_indices(7, 0.8, &mut StdRng::seed_from_u64(3));
        assert_eq!(train.len(), 5);
        assert_eq!(val.len(),   2);
    }

    #[test]
    fn test_single_item_goes_to_validation() {
        let (train, val) = random_split_indices(1, 0.8, &mut StdRng::seed_from_u64(3));
        assert!(train.is_empty());
        assert_eq!(val, vec![0]);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.8, &mut StdRng::seed_from_u64(0));
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn test_full_training_split() {
        let items: Vec<usize> = (0..10).collect();
        let (train, val)      = split_train_val(items, 1.0, &mut StdRng::seed_from_u64(0));
        assert_eq!(train.len(), 10);
        assert!(val.is_empty());
    }

    #[test]
    fn test_different_seeds_differ() {
        let (a, _) = random_split_indices(1000, 0.8, &mut StdRng::seed_from_u64(1));
        let (b, _) = random_split_indices(1000, 0.8, &mut StdRng::seed_from_u64(2));
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_split_sizes_and_disjointness(n in 1usize..5000, seed in any::<u64>()) {
            let (train, val) = random_split_indices(n, TRAIN_FRACTION, &mut StdRng::seed_from_u64(seed));

            let expected = ((n as f64) * 0.8).floor() as usize;
            prop_assert_eq!(train.len(), expected);
            prop_assert_eq!(val.len(), n - expected);

            let mut all: Vec<usize> = train.iter().chain(val.iter()).copied().collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
        }

        #[test]
        fn prop_same_seed_same_partition(n in 1usize..2000, seed in any::<u64>()) {
            let first  = random_split_indices(n, TRAIN_FRACTION, &mut StdRng::seed_from_u64(seed));
            let second = random_split_indices(n, TRAIN_FRACTION, &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(first, second);
        }
    }
}
