use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::optim::OptimizerKind;

/// Fine-tuning trains with the base learning rate divided by this factor.
/// Unfreezing backbone capacity at the full rate overwrites the pretrained
/// features.
pub const FINE_TUNE_LR_DIVISOR: f64 = 10.0;

/// Which backbone parameters may change during training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BackboneMode {
    /// Backbone fully frozen; only the head trains.
    Frozen,
    /// Backbone layers `[0, boundary)` frozen, the rest trainable.
    FineTune { boundary: usize },
}

impl Default for BackboneMode {
    fn default() -> Self {
        BackboneMode::Frozen
    }
}

/// Parameters bound to one training run.
///
/// # Fields
/// - `epochs`              — epoch budget
/// - `batch_size`          — samples per mini-batch
/// - `learning_rate`       — base rate; see [`TrainConfig::effective_learning_rate`]
/// - `optimizer`           — update rule (Adam or plain SGD)
/// - `backbone_mode`       — frozen backbone or partial fine-tuning
/// - `lr_patience`         — epochs without val-loss improvement before the LR decays (P1)
/// - `lr_factor`           — multiplier applied on decay
/// - `min_lr`              — floor for the decayed LR
/// - `lr_min_delta`        — smallest val-loss drop that resets the decay counter
/// - `early_stop_patience` — epochs without val-loss improvement before stopping (P2 > P1)
/// - `early_stop_min_delta` — smallest val-loss drop that resets the stopping counter
/// - `shuffle`             — reshuffle the training samples every epoch
/// - `seed`                — drives shuffling, dropout and augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub backbone_mode: BackboneMode,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    pub lr_min_delta: f64,
    pub early_stop_patience: usize,
    pub early_stop_min_delta: f64,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 20,
            batch_size: 32,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            backbone_mode: BackboneMode::Frozen,
            lr_patience: 3,
            lr_factor: 0.2,
            min_lr: 1e-5,
            lr_min_delta: 1e-4,
            early_stop_patience: 5,
            early_stop_min_delta: 0.0,
            shuffle: true,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Same run parameters, switched to partial fine-tuning above `boundary`.
    pub fn fine_tune_from(&self, boundary: usize) -> TrainConfig {
        TrainConfig { backbone_mode: BackboneMode::FineTune { boundary }, ..self.clone() }
    }

    /// Learning rate the optimizer starts with: the base rate in frozen mode,
    /// base / [`FINE_TUNE_LR_DIVISOR`] in fine-tune mode.
    pub fn effective_learning_rate(&self) -> f64 {
        match self.backbone_mode {
            BackboneMode::Frozen => self.learning_rate,
            BackboneMode::FineTune { .. } => self.learning_rate / FINE_TUNE_LR_DIVISOR,
        }
    }

    /// Rejects inconsistent runs before any work starts.
    ///
    /// `backbone_len` (when known) bounds the fine-tune boundary.
    pub fn validate(&self, backbone_len: Option<usize>) -> Result<()> {
        if self.epochs == 0 {
            return Err(PipelineError::Config("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PipelineError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return Err(PipelineError::Config(format!(
                "lr_factor must be in (0, 1), got {}",
                self.lr_factor
            )));
        }
        if self.min_lr < 0.0 || self.min_lr > self.effective_learning_rate() {
            return Err(PipelineError::Config(format!(
                "min_lr {} must be within [0, {}]",
                self.min_lr,
                self.effective_learning_rate()
            )));
        }
        if self.lr_min_delta < 0.0 || self.early_stop_min_delta < 0.0 {
            return Err(PipelineError::Config("min_delta values must not be negative".into()));
        }
        if self.lr_patience == 0 {
            return Err(PipelineError::Config("lr_patience must be at least 1".into()));
        }
        if self.early_stop_patience <= self.lr_patience {
            return Err(PipelineError::Config(format!(
                "early_stop_patience ({}) must exceed lr_patience ({}) so the learning rate \
                 can decay before training stops",
                self.early_stop_patience, self.lr_patience
            )));
        }
        if let (BackboneMode::FineTune { boundary }, Some(depth)) = (&self.backbone_mode, backbone_len) {
            if *boundary > depth {
                return Err(PipelineError::Config(format!(
                    "fine-tune boundary {} exceeds backbone depth {}",
                    boundary, depth
                )));
            }
        }
        Ok(())
    }
}
