// ============================================================
// Layer 4 — Image Datasets (Burn Dataset trait)
// ============================================================
// TransformedDataset pairs a decoded collection with a transform
// pipeline; `get` runs the pipeline so every epoch sees fresh
// augmentation. Subset exposes a list of indices into it, which
// is how the 80/20 train/validation views are built without
// copying any images.

use std::sync::{Arc, Mutex};

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, SeedableRng};

use crate::data::transforms::Compose;
use crate::domain::image::ImageCollection;

/// One transformed, normalized sample ready for the batcher.
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// CHW float pixels
    pub pixels: Vec<f32>,
    /// [channels, height, width]
    pub shape:  [usize; 3],
    pub label:  usize,
}

// ─── TransformedDataset ───────────────────────────────────────────────────────
pub struct TransformedDataset {
    collection: ImageCollection,
    transform:  Compose,
    // Shared by loader workers; only the random flips draw from it
    rng:        Mutex<StdRng>,
}

impl TransformedDataset {
    pub fn new(collection: ImageCollection, transform: Compose, seed: u64) -> Self {
        Self {
            collection,
            transform,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Dataset<ImageItem> for TransformedDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let item = self.collection.get(index)?;

        let tensor = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.transform.apply(&item.image, &mut *rng)
        };

        Some(ImageItem {
            pixels: tensor.data,
            shape:  tensor.shape,
            label:  item.label,
        })
    }

    fn len(&self) -> usize {
        self.collection.len()
    }
}

// ─── Subset ───────────────────────────────────────────────────────────────────
/// A view over `source` restricted to `indices`, in that order.
#[derive(Clone)]
pub struct Subset {
    source:  Arc<TransformedDataset>,
    indices: Vec<usize>,
}

impl Subset {
    pub fn new(source: Arc<TransformedDataset>, indices: Vec<usize>) -> Self {
        Self { source, indices }
    }

    /// Every item of `source` in stored order
    pub fn full(source: Arc<TransformedDataset>) -> Self {
        let indices = (0..source.len()).collect();
        Self { source, indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl Dataset<ImageItem> for Subset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let source_index = *self.indices.get(index)?;
        self.source.get(source_index)
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transforms::BaseTransforms;
    use crate::domain::image::LabeledImage;
    use image::{DynamicImage, RgbImage};

    fn collection(n: usize) -> ImageCollection {
        let items = (0..n)
            .map(|i| LabeledImage::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4)), i % 10))
            .collect();
        ImageCollection::new(items)
    }

    #[test]
    fn test_get_applies_transform() {
        let transform = BaseTransforms::build([3, 8, 8], false).unwrap();
        let ds = TransformedDataset::new(collection(3), transform, 0);

        let item = ds.get(1).unwrap();
        assert_eq!(item.shape, [3, 8, 8]);
        assert_eq!(item.pixels.len(), 3 * 64);
        assert_eq!(item.label, 1);
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn test_subset_maps_indices() {
        let transform = BaseTransforms::build([3, 4, 4], false).unwrap();
        let source = Arc::new(TransformedDataset::new(collection(10), transform, 0));
        let subset = Subset::new(source.clone(), vec![7, 2, 5]);

        assert_eq!(subset.len(), 3);
        assert_eq!(subset.get(0).unwrap().label, 7);
        assert_eq!(subset.get(2).unwrap().label, 5);
        assert!(subset.get(3).is_none());
        assert_eq!(Subset::full(source).len(), 10);
    }
}
