//! Directory-based dataset layout.
//!
//! ```text
//! train_set/
//! ├── Tomato___Early_blight/
//! │   ├── img001.jpg
//! │   └── ...
//! ├── Tomato___healthy/
//! └── ...
//! ```
//!
//! Class indices are assigned by sorting the class directory names, so the
//! same directory tree always yields the same label mapping.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{ensure_exists, PipelineError, Result};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// One image file and the class its directory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSample {
    pub path: PathBuf,
    pub label: usize,
    pub class_name: String,
}

/// All samples under one partition root (train or test).
#[derive(Debug, Clone)]
pub struct Partition {
    pub root: PathBuf,
    pub class_names: Vec<String>,
    /// Ordered by class, then by file name.
    pub samples: Vec<LabeledSample>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

impl Partition {
    /// Scans `root` for class directories and their image files.
    ///
    /// Fails with `MissingPath` if `root` does not exist and with
    /// `EmptyPartition` if it contains no class directory or no image.
    /// Class directories without images are kept (they show up as zero
    /// counts) so that class weighting can report them.
    pub fn scan(root: &Path) -> Result<Partition> {
        ensure_exists(root)?;

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let mut files: Vec<PathBuf> = WalkDir::new(root.join(class_name))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_image(e.path()))
                .map(|e| e.into_path())
                .collect();
            files.sort();
            debug!(class = %class_name, label, count = files.len(), "scanned class directory");
            samples.extend(files.into_iter().map(|path| LabeledSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        if samples.is_empty() {
            return Err(PipelineError::EmptyPartition(root.to_path_buf()));
        }

        info!(
            root = %root.display(),
            classes = class_names.len(),
            samples = samples.len(),
            "loaded partition"
        );
        Ok(Partition { root: root.to_path_buf(), class_names, samples })
    }

    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per class index.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.class_names.len()];
        for s in &self.samples {
            counts[s.label] += 1;
        }
        counts
    }

    /// Labels in sample order.
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Fails with `ClassMismatch` unless both partitions name the same classes
    /// in the same order.
    pub fn ensure_same_classes(&self, other: &Partition) -> Result<()> {
        if self.class_names != other.class_names {
            return Err(PipelineError::ClassMismatch(format!(
                "'{}' has classes {:?} but '{}' has {:?}",
                self.root.display(),
                self.class_names,
                other.root.display(),
                other.class_names
            )));
        }
        Ok(())
    }
}
