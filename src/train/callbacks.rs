//! End-of-epoch training control: best checkpoint, learning-rate decay on
//! plateau, and early stopping with best-weight restore.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;
use crate::network::network::Network;

// ---------------------------------------------------------------------------
// Best checkpoint
// ---------------------------------------------------------------------------

/// Writes the network to `path` whenever validation accuracy strictly improves.
pub struct BestCheckpoint {
    pub path: Option<PathBuf>,
    best_accuracy: Option<f64>,
    saves: usize,
}

impl BestCheckpoint {
    /// `path = None` tracks the best accuracy without touching the filesystem.
    pub fn new(path: Option<PathBuf>) -> Self {
        BestCheckpoint { path, best_accuracy: None, saves: 0 }
    }

    /// Returns `true` if this epoch produced a new best (and it was persisted).
    pub fn on_epoch_end(&mut self, epoch: usize, val_accuracy: f64, network: &Network) -> Result<bool> {
        let improved = self.best_accuracy.map_or(true, |best| val_accuracy > best);
        if !improved {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            network.save_json(path)?;
            info!(
                epoch,
                val_accuracy,
                previous = ?self.best_accuracy,
                "val_accuracy improved, checkpoint saved to {}",
                path.display()
            );
        }
        self.best_accuracy = Some(val_accuracy);
        self.saves += 1;
        Ok(true)
    }

    pub fn best_accuracy(&self) -> Option<f64> {
        self.best_accuracy
    }

    /// Number of times the checkpoint was (re)written.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

// ---------------------------------------------------------------------------
// Reduce LR on plateau
// ---------------------------------------------------------------------------

/// Multiplies the learning rate by `factor` after `patience` epochs without a
/// validation-loss improvement, never going below `min_lr`.
///
/// An epoch only counts as an improvement when it beats the best loss by more
/// than `min_delta`.
pub struct ReduceLrOnPlateau {
    pub patience: usize,
    pub factor: f64,
    pub min_lr: f64,
    pub min_delta: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub const DEFAULT_MIN_DELTA: f64 = 1e-4;

    pub fn new(patience: usize, factor: f64, min_lr: f64) -> Self {
        ReduceLrOnPlateau {
            patience,
            factor,
            min_lr,
            min_delta: Self::DEFAULT_MIN_DELTA,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Returns the new learning rate when a reduction happens.
    pub fn on_epoch_end(&mut self, val_loss: f64, current_lr: f64) -> Option<f64> {
        if val_loss < self.best - self.min_delta {
            self.best = val_loss;
            self.wait = 0;
            return None;
        }
        self.wait += 1;
        if self.wait < self.patience {
            return None;
        }
        self.wait = 0;
        if current_lr <= self.min_lr {
            return None;
        }
        let new_lr = (current_lr * self.factor).max(self.min_lr);
        info!(from = current_lr, to = new_lr, "val_loss plateaued, reducing learning rate");
        Some(new_lr)
    }
}

// ---------------------------------------------------------------------------
// Early stopping
// ---------------------------------------------------------------------------

/// Stops training after `patience` epochs without a validation-loss
/// improvement and keeps a copy of the best-loss parameters for restoring.
pub struct EarlyStopping {
    pub patience: usize,
    pub min_delta: f64,
    best: f64,
    wait: usize,
    best_epoch: Option<usize>,
    best_weights: Option<Network>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        EarlyStopping { patience, min_delta: 0.0, best: f64::INFINITY, wait: 0, best_epoch: None, best_weights: None }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Returns `true` when training should stop.
    pub fn on_epoch_end(&mut self, epoch: usize, val_loss: f64, network: &Network) -> bool {
        if val_loss < self.best - self.min_delta {
            self.best = val_loss;
            self.wait = 0;
            self.best_epoch = Some(epoch);
            self.best_weights = Some(network.clone());
            return false;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            warn!(
                epoch,
                patience = self.patience,
                best_epoch = ?self.best_epoch,
                "early stopping: val_loss has not improved"
            );
            return true;
        }
        false
    }

    /// Replaces `network`'s parameters with the best-observed ones.
    /// Returns the epoch they came from.
    pub fn restore_best(&mut self, network: &mut Network) -> Option<usize> {
        let best = self.best_weights.take()?;
        *network = best;
        info!(epoch = ?self.best_epoch, "restored best weights");
        self.best_epoch
    }
}
