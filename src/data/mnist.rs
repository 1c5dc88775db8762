// ============================================================
// Layer 4 — MNIST Provider
// ============================================================
// Reads the gzip-compressed IDX files:
//
//   images: magic 0x00000803, count, rows, cols, then count*rows*cols bytes
//   labels: magic 0x00000801, count, then count bytes
//
// All header integers are big-endian u32.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GrayImage};

use crate::data::download::{download_file, read_gz};
use crate::domain::{
    image::{ImageCollection, LabeledImage, Split},
    traits::DatasetProvider,
};

const MIRROR: &str = "https://ossci-datasets.s3.amazonaws.com/mnist";

const IMAGES_MAGIC: u32 = 0x0803;
const LABELS_MAGIC: u32 = 0x0801;
const NUM_CLASSES: usize = 10;

pub struct Mnist;

impl Mnist {
    fn raw_dir(root: &Path) -> PathBuf {
        root.join("MNIST").join("raw")
    }

    fn files(split: Split) -> [&'static str; 2] {
        match split {
            Split::Train => ["train-images-idx3-ubyte.gz", "train-labels-idx1-ubyte.gz"],
            Split::Test  => ["t10k-images-idx3-ubyte.gz", "t10k-labels-idx1-ubyte.gz"],
        }
    }
}

impl DatasetProvider for Mnist {
    fn name(&self) -> &'static str {
        "MNIST"
    }

    fn channels(&self) -> usize {
        1
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    fn is_cached(&self, root: &Path, split: Split) -> bool {
        let dir = Self::raw_dir(root);
        Self::files(split).iter().all(|f| dir.join(f).is_file())
    }

    fn download(&self, root: &Path, split: Split) -> Result<()> {
        let dir = Self::raw_dir(root);
        for file in Self::files(split) {
            download_file(&format!("{MIRROR}/{file}"), &dir.join(file))?;
        }
        Ok(())
    }

    fn load(&self, root: &Path, split: Split) -> Result<ImageCollection> {
        let dir = Self::raw_dir(root);
        let [images_file, labels_file] = Self::files(split);

        let images = read_gz(&dir.join(images_file))?;
        let labels = read_gz(&dir.join(labels_file))?;
        let items  = parse_idx(&images, &labels)
            .with_context(|| format!("Corrupt MNIST {split} files in '{}'", dir.display()))?;

        tracing::info!("Loaded {} {} images from '{}'", items.len(), split, dir.display());
        Ok(ImageCollection::new(items))
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let chunk = bytes
        .get(offset..offset + 4)
        .context("unexpected end of IDX header")?;
    Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Pair an IDX image file with its IDX label file.
pub fn parse_idx(images: &[u8], labels: &[u8]) -> Result<Vec<LabeledImage>> {
    if read_u32(images, 0)? != IMAGES_MAGIC {
        bail!("image file has wrong magic number");
    }
    if read_u32(labels, 0)? != LABELS_MAGIC {
        bail!("label file has wrong magic number");
    }

    let count = read_u32(images, 4)? as usize;
    let rows  = read_u32(images, 8)? as usize;
    let cols  = read_u32(images, 12)? as usize;
    if read_u32(labels, 4)? as usize != count {
        bail!("image and label files disagree on the number of items");
    }
    if rows == 0 || cols == 0 {
        bail!("image header declares a {rows}x{cols} image");
    }

    let pixels = images.get(16..16 + count * rows * cols).context("image data truncated")?;
    let labels = labels.get(8..8 + count).context("label data truncated")?;

    pixels
        .chunks_exact(rows * cols)
        .zip(labels.iter())
        .enumerate()
        .map(|(i, (px, &label))| {
            let label = label as usize;
            if label >= NUM_CLASSES {
                bail!("item {i} has label {label}, expected < {NUM_CLASSES}");
            }
            let image = GrayImage::from_raw(cols as u32, rows as u32, px.to_vec())
                .context("pixel buffer does not match the header")?;
            Ok(LabeledImage::new(DynamicImage::ImageLuma8(image), label))
        })
        .collect()
}
