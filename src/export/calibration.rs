//! Calibration samples for estimating activation ranges during int8 export.

use std::cell::Cell;
use std::path::PathBuf;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::image::{load_rgb, to_input};
use crate::dataset::partition::Partition;
use crate::error::{PipelineError, Result};

/// Where calibration inputs come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationSource {
    /// Uniform noise in the model's input range [-1, 1].
    Synthetic { seed: u64 },
    /// Real images from a partition directory, evenly strided across classes.
    Representative { root: PathBuf },
}

/// How many calibration inputs to draw and from where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPolicy {
    pub samples: usize,
    pub source: CalibrationSource,
}

impl CalibrationPolicy {
    /// Builds the lazy dataset. Representative images are decoded up front
    /// at `image_size`; tensors are still produced on demand.
    pub fn dataset(&self, input_len: usize, image_size: u32) -> Result<CalibrationDataset> {
        if self.samples == 0 {
            return Err(PipelineError::Config("calibration needs at least one sample".into()));
        }
        let source = match &self.source {
            CalibrationSource::Synthetic { seed } => SampleSource::Synthetic { seed: *seed, input_len },
            CalibrationSource::Representative { root } => {
                let partition = Partition::scan(root)?;
                let take = self.samples.min(partition.len());
                let stride = partition.len() as f64 / take as f64;
                let images = (0..take)
                    .map(|i| load_rgb(&partition.samples[(i as f64 * stride) as usize].path, image_size))
                    .collect::<Result<Vec<_>>>()?;
                if images.iter().any(|img| to_input_len(img) != input_len) {
                    return Err(PipelineError::Config(format!(
                        "calibration images at {}x{} do not match the model input length {}",
                        image_size, image_size, input_len
                    )));
                }
                SampleSource::Images(images)
            }
        };
        Ok(CalibrationDataset { len: self.samples, source, drawn: Cell::new(0) })
    }
}

fn to_input_len(img: &RgbImage) -> usize {
    (img.width() * img.height() * 3) as usize
}

enum SampleSource {
    Synthetic { seed: u64, input_len: usize },
    /// Cycled when fewer images than samples are available.
    Images(Vec<RgbImage>),
}

/// A finite, restartable sequence of exactly `len()` calibration inputs.
///
/// Inputs are materialized one at a time as the iterator advances. The
/// dataset counts every input handed out across all iterations.
pub struct CalibrationDataset {
    len: usize,
    source: SampleSource,
    drawn: Cell<usize>,
}

impl CalibrationDataset {
    pub fn synthetic(samples: usize, input_len: usize, seed: u64) -> Self {
        CalibrationDataset {
            len: samples,
            source: SampleSource::Synthetic { seed, input_len },
            drawn: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total inputs produced so far.
    pub fn drawn(&self) -> usize {
        self.drawn.get()
    }

    /// Starts a fresh pass; synthetic inputs repeat exactly.
    pub fn iter(&self) -> CalibrationIter<'_> {
        let rng = match self.source {
            SampleSource::Synthetic { seed, .. } => Some(StdRng::seed_from_u64(seed)),
            SampleSource::Images(_) => None,
        };
        CalibrationIter { dataset: self, pos: 0, rng }
    }
}

pub struct CalibrationIter<'a> {
    dataset: &'a CalibrationDataset,
    pos: usize,
    rng: Option<StdRng>,
}

impl Iterator for CalibrationIter<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Vec<f64>> {
        if self.pos >= self.dataset.len {
            return None;
        }
        let sample = match (&self.dataset.source, self.rng.as_mut()) {
            (SampleSource::Synthetic { input_len, .. }, Some(rng)) => {
                (0..*input_len).map(|_| rng.gen_range(-1.0..1.0)).collect()
            }
            (SampleSource::Images(images), _) => to_input(&images[self.pos % images.len()]),
            (SampleSource::Synthetic { .. }, None) => return None,
        };
        self.pos += 1;
        self.dataset.drawn.set(self.dataset.drawn.get() + 1);
        debug!(index = self.pos, "drew calibration sample");
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CalibrationIter<'_> {}
