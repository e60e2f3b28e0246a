//! Pipeline configuration, optionally loaded from a JSON file.
//!
//! Every section and field has a default, so a config file only needs the
//! values it changes:
//!
//! ```json
//! { "train": { "epochs": 5, "backbone_mode": { "mode": "fine_tune", "boundary": 1 } } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augment::Augmentation;
use crate::error::{ensure_exists, PipelineError, Result};
use crate::evaluate::evaluator::Evaluator;
use crate::export::exporter::{ExportConfig, Exporter};
use crate::inference::history::DetectionHistory;
use crate::network::spec::{BackboneSpec, HeadSpec};
use crate::train::train_config::TrainConfig;
use crate::train::trainer::{TrainPaths, Trainer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub train_dir: PathBuf,
    pub test_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub model: PathBuf,
    pub history: PathBuf,
    pub reports_dir: PathBuf,
    pub export: PathBuf,
    pub labels: PathBuf,
    /// JSON-lines log written by `predict --record`.
    pub detections: PathBuf,
    pub pretrained_backbone: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            train_dir: PathBuf::from("dataset/tomato/train_set"),
            test_dir: PathBuf::from("dataset/tomato/test_set"),
            checkpoint: PathBuf::from("trained_models/best_model.json"),
            model: PathBuf::from("trained_models/final_model.json"),
            history: PathBuf::from("trained_models/training_history.json"),
            reports_dir: PathBuf::from("reports"),
            export: PathBuf::from("trained_models/model.tlnn"),
            labels: PathBuf::from("trained_models/labels.txt"),
            detections: PathBuf::from("trained_models/detections.jsonl"),
            pretrained_backbone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Square side images are resized to.
    pub size: u32,
    pub augmentation: Augmentation,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig { size: 32, augmentation: Augmentation::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backbone: BackboneSpec,
    pub head: HeadSpec,
}

/// Everything one invocation of the pipeline needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub image: ImageConfig,
    pub model: ModelConfig,
    pub train: TrainConfig,
    pub export: ExportConfig,
}

impl PipelineConfig {
    pub fn load_json(path: &Path) -> Result<PipelineConfig> {
        ensure_exists(path)?;
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn detection_history(&self) -> DetectionHistory {
        DetectionHistory::new(&self.paths.detections)
    }

    /// The training stage, validating on the test partition.
    pub fn trainer(&self) -> Trainer {
        let paths = TrainPaths {
            train_dir: self.paths.train_dir.clone(),
            val_dir: self.paths.test_dir.clone(),
            checkpoint: Some(self.paths.checkpoint.clone()),
            model: self.paths.model.clone(),
            history: Some(self.paths.history.clone()),
            pretrained_backbone: self.paths.pretrained_backbone.clone(),
        };
        Trainer {
            paths,
            image_size: self.image.size,
            augmentation: self.image.augmentation.clone(),
            backbone: self.model.backbone.clone(),
            head: self.model.head.clone(),
            config: self.train.clone(),
        }
    }

    /// Evaluates the best checkpoint on the test partition.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator {
            model_path: self.paths.checkpoint.clone(),
            test_dir: self.paths.test_dir.clone(),
            out_dir: self.paths.reports_dir.clone(),
            default_image_size: self.image.size,
        }
    }

    /// Exports the best checkpoint; representative calibration reads the train partition.
    pub fn exporter(&self) -> Exporter {
        Exporter {
            model_path: self.paths.checkpoint.clone(),
            output_path: self.paths.export.clone(),
            labels_path: Some(self.paths.labels.clone()),
            representative_dir: self.paths.train_dir.clone(),
            default_image_size: self.image.size,
            config: self.export.clone(),
        }
    }
}
