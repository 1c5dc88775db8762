// ============================================================
// Layer 3 — Labeled Image Domain Types
// ============================================================
// A decoded image plus its class index, and the in-memory
// collection a dataset provider returns for one split.
//
// Images are kept as `image::DynamicImage` so the transform
// pipeline can resize and flip them without re-encoding.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Which half of a dataset provider's files to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    /// The provider's training files (later split 80/20 into train/validation)
    Train,
    /// The provider's held-out evaluation files
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test  => write!(f, "test"),
        }
    }
}

/// One decoded image with its ground-truth class.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub image: DynamicImage,
    pub label: usize,
}

impl LabeledImage {
    pub fn new(image: DynamicImage, label: usize) -> Self {
        Self { image, label }
    }
}

/// All images of one split, in the order they are stored on disk.
#[derive(Debug, Clone)]
pub struct ImageCollection {
    items: Vec<LabeledImage>,
}

impl ImageCollection {
    pub fn new(items: Vec<LabeledImage>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, index: usize) -> Option<&LabeledImage> {
        self.items.get(index)
    }

    #[cfg(test)]
    pub fn labels(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().map(|item| item.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_collection_preserves_order() {
        let items = (0..4)
            .map(|i| LabeledImage::new(DynamicImage::ImageLuma8(GrayImage::new(2, 2)), i))
            .collect();
        let collection = ImageCollection::new(items);

        assert_eq!(collection.len(), 4);
        assert_eq!(collection.labels().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(collection.get(2).map(|i| i.label), Some(2));
        assert!(collection.get(4).is_none());
    }

    #[test]
    fn test_split_display() {
        assert_eq!(Split::Train.to_string(), "train");
        assert_eq!(Split::Test.to_string(), "test");
    }
}
