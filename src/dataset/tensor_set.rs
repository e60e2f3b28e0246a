use std::borrow::Cow;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::dataset::augment::Augmentation;
use crate::dataset::image::{load_rgb, to_input};
use crate::dataset::partition::Partition;
use crate::error::{PipelineError, Result};

/// Network-ready inputs with their class labels, in a fixed order.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSet {
    pub inputs: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub n_classes: usize,
}

impl TensorSet {
    /// # Panics
    /// Panics if inputs and labels differ in length or a label is out of range.
    pub fn new(inputs: Vec<Vec<f64>>, labels: Vec<usize>, n_classes: usize) -> TensorSet {
        assert_eq!(inputs.len(), labels.len(), "inputs and labels must have equal length");
        assert!(labels.iter().all(|&l| l < n_classes), "label out of range");
        TensorSet { inputs, labels, n_classes }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input_len(&self) -> usize {
        self.inputs.first().map(Vec::len).unwrap_or(0)
    }
}

/// Supplies the training tensors for each epoch.
///
/// A plain `TensorSet` yields the same data every epoch; an
/// [`AugmentedSource`] re-draws augmentations each time.
pub trait EpochSource {
    fn n_classes(&self) -> usize;
    fn epoch(&mut self, epoch: usize) -> Cow<'_, TensorSet>;
}

impl EpochSource for TensorSet {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn epoch(&mut self, _epoch: usize) -> Cow<'_, TensorSet> {
        Cow::Borrowed(self)
    }
}

/// A partition decoded to resized RGB images, kept in sample order.
#[derive(Debug, Clone)]
pub struct DecodedPartition {
    pub images: Vec<RgbImage>,
    pub labels: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DecodedPartition {
    /// Decodes every sample of `partition` at `size × size`. Order is preserved.
    pub fn load(partition: &Partition, size: u32) -> Result<DecodedPartition> {
        if partition.is_empty() {
            return Err(PipelineError::EmptyPartition(partition.root.clone()));
        }
        let images = partition.samples.iter()
            .map(|s| load_rgb(&s.path, size))
            .collect::<Result<Vec<_>>>()?;
        info!(images = images.len(), size, root = %partition.root.display(), "decoded partition");
        Ok(DecodedPartition {
            images,
            labels: partition.labels(),
            class_names: partition.class_names.clone(),
        })
    }

    /// Un-augmented tensors in sample order.
    pub fn tensors(&self) -> TensorSet {
        TensorSet::new(
            self.images.iter().map(to_input).collect(),
            self.labels.clone(),
            self.class_names.len(),
        )
    }
}

/// Training source that applies a fresh random augmentation every epoch.
pub struct AugmentedSource {
    decoded: DecodedPartition,
    augmentation: Augmentation,
    rng: StdRng,
}

impl AugmentedSource {
    pub fn new(decoded: DecodedPartition, augmentation: Augmentation, seed: u64) -> Self {
        AugmentedSource { decoded, augmentation, rng: StdRng::seed_from_u64(seed) }
    }
}

impl EpochSource for AugmentedSource {
    fn n_classes(&self) -> usize {
        self.decoded.class_names.len()
    }

    fn epoch(&mut self, _epoch: usize) -> Cow<'_, TensorSet> {
        let inputs = self.decoded.images.iter()
            .map(|img| to_input(&self.augmentation.apply(img, &mut self.rng)))
            .collect();
        Cow::Owned(TensorSet::new(inputs, self.decoded.labels.clone(), self.decoded.class_names.len()))
    }
}
