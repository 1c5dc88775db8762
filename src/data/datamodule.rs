// ============================================================
// Layer 4 — Image Data Module
// ============================================================
// Owns everything between the dataset files on disk and the
// batches the trainer consumes:
//
//   prepare()      → make sure train + test files are cached
//   setup(stage)   → Fit:  train collection + train transform,
//                          permuted and cut 80/20 into train/val
//                    Test: test collection + eval transform
//                    None: both of the above
//   *_loader()     → Burn DataLoaders; only train shuffles
//
// Seeds for the split, the augmentation RNG and the loader
// shuffle are handed in explicitly, so two data modules built
// from the same seeds produce identical partitions.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    data::dataset::Dataset,
    prelude::*,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::{Subset, TransformedDataset},
    splitter::{random_split_indices, TRAIN_FRACTION},
    transforms::Compose,
};
use crate::domain::{
    error::ConfigError,
    image::Split,
    stage::Stage,
    traits::DatasetProvider,
};

pub type ImageLoader<B> = Arc<dyn DataLoader<ImageBatch<B>>>;

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Dataset cache directory
    pub root_dir:    PathBuf,
    pub batch_size:  usize,
    /// Loader threads; 0 loads synchronously on the calling thread
    pub num_workers: usize,
    /// [channels, size, size]
    pub image_shape: [usize; 3],
}

/// Seeds for every stochastic step of the data pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSeeds {
    pub split:   u64,
    pub augment: u64,
    pub shuffle: u64,
}

// ─── DataModule ───────────────────────────────────────────────────────────────
pub struct DataModule {
    provider:         Box<dyn DatasetProvider>,
    config:           DataConfig,
    train_transforms: Compose,
    test_transforms:  Compose,
    seeds:            DataSeeds,
    train_ds:         Option<Subset>,
    val_ds:           Option<Subset>,
    test_ds:          Option<Subset>,
}

impl DataModule {
    /// Build a data module. Fails if the dataset's native channel count
    /// disagrees with the configured image shape.
    pub fn new(
        provider:         Box<dyn DatasetProvider>,
        config:           DataConfig,
        train_transforms: Compose,
        test_transforms:  Compose,
        seeds:            DataSeeds,
    ) -> Result<Self, ConfigError> {
        if config.batch_size == 0 {
            return Err(ConfigError::NotPositive { name: "batch_size" });
        }
        if provider.channels() != config.image_shape[0] {
            return Err(ConfigError::ChannelMismatch {
                dataset:    provider.name(),
                native:     provider.channels(),
                configured: config.image_shape[0],
            });
        }

        Ok(Self {
            provider,
            config,
            train_transforms,
            test_transforms,
            seeds,
            train_ds: None,
            val_ds:   None,
            test_ds:  None,
        })
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Download the train and test files if they are not cached yet.
    pub fn prepare(&self) -> Result<()> {
        prepare_dataset(self.provider.as_ref(), &self.config.root_dir)
    }

    /// Load and split the collections needed for `stage`.
    /// `Validate` and `Predict` load nothing.
    pub fn setup(&mut self, stage: Option<Stage>) -> Result<()> {
        if matches!(stage, None | Some(Stage::Fit)) {
            let collection = self.provider.load(&self.config.root_dir, Split::Train)?;
            let total      = collection.len();
            let dataset    = Arc::new(TransformedDataset::new(
                collection,
                self.train_transforms.clone(),
                self.seeds.augment,
            ));

            let mut rng = StdRng::seed_from_u64(self.seeds.split);
            let (train_idx, val_idx) = random_split_indices(total, TRAIN_FRACTION, &mut rng);
            tracing::info!(
                "{} fit split: {} train, {} validation",
                self.provider.name(),
                train_idx.len(),
                val_idx.len()
            );

            self.train_ds = Some(Subset::new(dataset.clone(), train_idx));
            self.val_ds   = Some(Subset::new(dataset, val_idx));
        }

        if matches!(stage, None | Some(Stage::Test)) {
            let collection = self.provider.load(&self.config.root_dir, Split::Test)?;
            let dataset    = Arc::new(TransformedDataset::new(
                collection,
                self.test_transforms.clone(),
                self.seeds.augment,
            ));
            tracing::info!("{} test set: {} images", self.provider.name(), dataset.len());
            self.test_ds = Some(Subset::full(dataset));
        }

        Ok(())
    }

    pub fn train_dataset(&self) -> Option<&Subset> {
        self.train_ds.as_ref()
    }

    pub fn val_dataset(&self) -> Option<&Subset> {
        self.val_ds.as_ref()
    }

    pub fn test_dataset(&self) -> Option<&Subset> {
        self.test_ds.as_ref()
    }

    /// Shuffled training batches; reshuffled on every `iter()`
    pub fn train_loader<B: Backend>(&self, device: &B::Device) -> Result<ImageLoader<B>> {
        let dataset = self.train_ds.clone().ok_or(ConfigError::NotSetUp("train"))?;
        Ok(self.build_loader(dataset, Some(self.seeds.shuffle), device))
    }

    /// Validation batches in stored order
    pub fn val_loader<B: Backend>(&self, device: &B::Device) -> Result<ImageLoader<B>> {
        let dataset = self.val_ds.clone().ok_or(ConfigError::NotSetUp("val"))?;
        Ok(self.build_loader(dataset, None, device))
    }

    /// Test batches in stored order
    pub fn test_loader<B: Backend>(&self, device: &B::Device) -> Result<ImageLoader<B>> {
        let dataset = self.test_ds.clone().ok_or(ConfigError::NotSetUp("test"))?;
        Ok(self.build_loader(dataset, None, device))
    }

    fn build_loader<B: Backend>(
        &self,
        dataset: Subset,
        shuffle: Option<u64>,
        device:  &B::Device,
    ) -> ImageLoader<B> {
        let mut builder = DataLoaderBuilder::new(ImageBatcher::<B>::new(device.clone()))
            .batch_size(self.config.batch_size);

        if let Some(seed) = shuffle {
            builder = builder.shuffle(seed);
        }
        if self.config.num_workers > 0 {
            builder = builder.num_workers(self.config.num_workers);
        }

        builder.build(dataset)
    }
}

/// Download every split of `provider` missing under `root_dir`.
pub fn prepare_dataset(provider: &dyn DatasetProvider, root_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(root_dir)?;
    for split in [Split::Train, Split::Test] {
        if provider.is_cached(root_dir, split) {
            tracing::debug!("{} {split} data already cached", provider.name());
            continue;
        }
        tracing::info!("Preparing {} {split} data in '{}'", provider.name(), root_dir.display());
        provider.download(root_dir, split)?;
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{cifar::{write_cifar10_fixture, Cifar10}, mnist::Mnist, transforms::BaseTransforms};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    const SEEDS: DataSeeds = DataSeeds { split: 11, augment: 12, shuffle: 13 };

    fn module(root: PathBuf, batch_size: usize) -> DataModule {
        let shape = [3, 32, 32];
        DataModule::new(
            Box::new(Cifar10),
            DataConfig { root_dir: root, batch_size, num_workers: 0, image_shape: shape },
            BaseTransforms::build(shape, true).unwrap(),
            BaseTransforms::build(shape, false).unwrap(),
            SEEDS,
        )
        .unwrap()
    }

    #[test]
    fn test_channel_mismatch_rejected_before_io() {
        let shape = [3, 32, 32];
        let result = DataModule::new(
            Box::new(Mnist),
            DataConfig { root_dir: "/nonexistent".into(), batch_size: 8, num_workers: 0, image_shape: shape },
            BaseTransforms::build(shape, true).unwrap(),
            BaseTransforms::build(shape, false).unwrap(),
            SEEDS,
        );
        assert!(matches!(result, Err(ConfigError::ChannelMismatch { native: 1, configured: 3, .. })));
    }

    #[test]
    fn test_prepare_is_noop_when_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_fixture(dir.path(), 10, 5);
        let dm = module(dir.path().to_path_buf(), 4);
        dm.prepare().unwrap();
        dm.prepare().unwrap();
    }

    #[test]
    fn test_loader_before_setup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dm  = module(dir.path().to_path_buf(), 4);
        assert!(dm.train_loader::<TestBackend>(&Default::default()).is_err());
        assert!(dm.test_loader::<TestBackend>(&Default::default()).is_err());
    }

    #[test]
    fn test_setup_fit_only() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_fixture(dir.path(), 50, 10);
        let mut dm = module(dir.path().to_path_buf(), 4);

        dm.setup(Some(Stage::Fit)).unwrap();
        assert_eq!(dm.train_dataset().unwrap().len(), 40);
        assert_eq!(dm.val_dataset().unwrap().len(), 10);
        assert!(dm.test_dataset().is_none());
    }

    #[test]
    fn test_setup_validate_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_fixture(dir.path(), 10, 10);
        let mut dm = module(dir.path().to_path_buf(), 4);

        dm.setup(Some(Stage::Validate)).unwrap();
        assert!(dm.train_dataset().is_none());
        assert!(dm.test_dataset().is_none());
    }

    #[test]
    fn test_same_seed_same_partition() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_fixture(dir.path(), 37, 3);

        let mut a = module(dir.path().to_path_buf(), 4);
        let mut b = module(dir.path().to_path_buf(), 4);
        a.setup(Some(Stage::Fit)).unwrap();
        b.setup(Some(Stage::Fit)).unwrap();

        assert_eq!(a.train_dataset().unwrap().indices(), b.train_dataset().unwrap().indices());
        assert_eq!(a.val_dataset().unwrap().indices(), b.val_dataset().unwrap().indices());
        assert_eq!(a.train_dataset().unwrap().len(), 29);
        assert_eq!(a.val_dataset().unwrap().len(), 8);
    }

    #[test]
    fn test_end_to_end_cifar10_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_fixture(dir.path(), 150, 70);
        let mut dm = module(dir.path().to_path_buf(), 64);
        dm.prepare().unwrap();
        dm.setup(None).unwrap();

        let device = Default::default();

        let train = dm.train_loader::<TestBackend>(&device).unwrap();
        let mut seen = 0;
        for batch in train.iter() {
            let [n, c, h, w] = batch.images.dims();
            assert!(n <= 64);
            assert_eq!([c, h, w], [3, 32, 32]);
            let labels: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
            assert!(labels.iter().all(|&l| (0..=9).contains(&l)));
            seen += n;
        }
        assert_eq!(seen, 120);

        let test = dm.test_loader::<TestBackend>(&device).unwrap();
        let labels: Vec<i64> = test
            .iter()
            .flat_map(|batch| batch.targets.into_data().iter::<i64>().collect::<Vec<_>>())
            .collect();
        let expected: Vec<i64> = (0..70).map(|i| (i % 10) as i64).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_train_loader_reshuffles_each_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar10_fixture(dir.path(), 200, 1);
        let mut dm = module(dir.path().to_path_buf(), 160);
        dm.setup(Some(Stage::Fit)).unwrap();

        let loader = dm.train_loader::<TestBackend>(&Default::default()).unwrap();
        let pass = |loader: &ImageLoader<TestBackend>| -> Vec<i64> {
            loader.iter()
                .flat_map(|b| b.targets.into_data().iter::<i64>().collect::<Vec<_>>())
                .collect()
        };
        assert_ne!(pass(&loader), pass(&loader));
    }
}
