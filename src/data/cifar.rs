// ============================================================
// Layer 4 — CIFAR-10 / CIFAR-100 Providers
// ============================================================
// Reads the "binary version" archives published at
// https://www.cs.toronto.edu/~kriz/cifar.html
//
// Record layout (one image per record, no header):
//   CIFAR-10:  <1 x label><3072 x pixel>
//   CIFAR-100: <1 x coarse label><1 x fine label><3072 x pixel>
//
// Pixels are stored channel-major: 1024 red, 1024 green,
// 1024 blue, each plane row-major over 32x32.
//
// Files after extraction:
//   cifar-10-batches-bin/data_batch_{1..5}.bin, test_batch.bin
//   cifar-100-binary/train.bin, test.bin

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use image::{DynamicImage, RgbImage};

use crate::data::download::{download_file, extract_tar_gz};
use crate::domain::{
    image::{ImageCollection, LabeledImage, Split},
    traits::DatasetProvider,
};

const SIDE:   usize = 32;
const PLANE:  usize = SIDE * SIDE;
const PIXELS: usize = 3 * PLANE;

/// Static description of one CIFAR variant
struct CifarLayout {
    name:         &'static str,
    url:          &'static str,
    archive:      &'static str,
    folder:       &'static str,
    train_files:  &'static [&'static str],
    test_files:   &'static [&'static str],
    label_bytes:  usize,
    num_classes:  usize,
}

const CIFAR10: CifarLayout = CifarLayout {
    name:        "CIFAR10",
    url:         "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz",
    archive:     "cifar-10-binary.tar.gz",
    folder:      "cifar-10-batches-bin",
    train_files: &[
        "data_batch_1.bin",
        "data_batch_2.bin",
        "data_batch_3.bin",
        "data_batch_4.bin",
        "data_batch_5.bin",
    ],
    test_files:  &["test_batch.bin"],
    label_bytes: 1,
    num_classes: 10,
};

const CIFAR100: CifarLayout = CifarLayout {
    name:        "CIFAR100",
    url:         "https://www.cs.toronto.edu/~kriz/cifar-100-binary.tar.gz",
    archive:     "cifar-100-binary.tar.gz",
    folder:      "cifar-100-binary",
    train_files: &["train.bin"],
    test_files:  &["test.bin"],
    label_bytes: 2,
    num_classes: 100,
};

impl CifarLayout {
    fn files(&self, split: Split) -> &'static [&'static str] {
        match split {
            Split::Train => self.train_files,
            Split::Test  => self.test_files,
        }
    }

    fn is_cached(&self, root: &Path, split: Split) -> bool {
        let folder = root.join(self.folder);
        self.files(split).iter().all(|f| folder.join(f).is_file())
    }

    fn download(&self, root: &Path, split: Split) -> Result<()> {
        if self.is_cached(root, split) {
            tracing::debug!("{} {} files already present", self.name, split);
            return Ok(());
        }
        let archive = download_file(self.url, &root.join(self.archive))?;
        extract_tar_gz(&archive, root)?;

        if !self.is_cached(root, split) {
            bail!(
                "Archive '{}' did not contain the expected {} files",
                archive.display(),
                self.name
            );
        }
        Ok(())
    }

    fn load(&self, root: &Path, split: Split) -> Result<ImageCollection> {
        let folder = root.join(self.folder);
        let mut items = Vec::new();

        for file in self.files(split) {
            let path  = folder.join(file);
            let bytes = fs::read(&path)
                .with_context(|| format!("Cannot read {} file '{}'", self.name, path.display()))?;
            items.extend(
                parse_records(&bytes, self.label_bytes, self.num_classes)
                    .with_context(|| format!("Corrupt {} file '{}'", self.name, path.display()))?,
            );
        }

        tracing::info!("Loaded {} {} images from '{}'", items.len(), split, folder.display());
        Ok(ImageCollection::new(items))
    }
}

/// Decode a CIFAR binary file. The fine label is the last label byte.
pub fn parse_records(bytes: &[u8], label_bytes: usize, num_classes: usize) -> Result<Vec<LabeledImage>> {
    let record = label_bytes + PIXELS;
    if bytes.len() % record != 0 {
        bail!("file size {} is not a multiple of the {record}-byte record", bytes.len());
    }

    bytes
        .chunks_exact(record)
        .enumerate()
        .map(|(i, chunk)| {
            let label = chunk[label_bytes - 1] as usize;
            if label >= num_classes {
                bail!("record {i} has label {label}, expected < {num_classes}");
            }

            let planes = &chunk[label_bytes..];
            let mut hwc = Vec::with_capacity(PIXELS);
            for p in 0..PLANE {
                hwc.push(planes[p]);
                hwc.push(planes[PLANE + p]);
                hwc.push(planes[2 * PLANE + p]);
            }
            let image = RgbImage::from_raw(SIDE as u32, SIDE as u32, hwc)
                .context("pixel buffer does not match 32x32x3")?;

            Ok(LabeledImage::new(DynamicImage::ImageRgb8(image), label))
        })
        .collect()
}

// ─── Providers ────────────────────────────────────────────────────────────────
pub struct Cifar10;

pub struct Cifar100;

macro_rules! cifar_provider {
    ($ty:ty, $layout:expr) => {
        impl DatasetProvider for $ty {
            fn name(&self) -> &'static str { $layout.name }

            fn channels(&self) -> usize { 3 }

            fn num_classes(&self) -> usize { $layout.num_classes }

            fn is_cached(&self, root: &Path, split: Split) -> bool {
                $layout.is_cached(root, split)
            }

            fn download(&self, root: &Path, split: Split) -> Result<()> {
                $layout.download(root, split)
            }

            fn load(&self, root: &Path, split: Split) -> Result<ImageCollection> {
                $layout.load(root, split)
            }
        }
    };
}

cifar_provider!(Cifar10, CIFAR10);
cifar_provider!(Cifar100, CIFAR100);

// ─── Test Fixtures ────────────────────────────────────────────────────────────
/// Write a CIFAR-10 style folder with `train` records spread over the
/// five training batches and `test` records in the test batch.
/// Record `i` has label `i % 10` and every pixel set to `i % 256`.
#[cfg(test)]
pub fn write_cifar10_fixture(root: &Path, train: usize, test: usize) {
    let folder = root.join(CIFAR10.folder);
    fs::create_dir_all(&folder).unwrap();

    let record = |i: usize| {
        let mut r = vec![(i % 10) as u8];
        r.extend(std::iter::repeat((i % 256) as u8).take(PIXELS));
        r
    };

    let per_batch = train.div_ceil(5);
    for (b, file) in CIFAR10.train_files.iter().enumerate() {
        let start = (b * per_batch).min(train);
        let end   = ((b + 1) * per_batch).min(train);
        let bytes: Vec<u8> = (start..end).flat_map(record).collect();
        fs::write(folder.join(file), bytes).unwrap();
    }
    let bytes: Vec<u8> = (0..test).flat_map(record).collect();
    fs::write(folder.join(CIFAR10.test_files[0]), bytes).unwrap();
}
