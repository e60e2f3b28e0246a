use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::Result;

/// Per-epoch training statistics emitted by `train_loop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Epoch budget for this run.
    pub total_epochs: usize,
    /// Mean class-weighted training loss.
    pub train_loss: f64,
    /// Training accuracy in [0, 1] (measured with dropout active).
    pub train_accuracy: f64,
    /// Mean unweighted validation loss.
    pub val_loss: f64,
    /// Validation accuracy in [0, 1].
    pub val_accuracy: f64,
    /// Learning rate the epoch was trained with.
    pub learning_rate: f64,
    /// Wall-clock duration of this epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Ordered per-epoch statistics of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochStats>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }

    /// Epoch with the highest validation accuracy (earliest on ties).
    pub fn best_by_val_accuracy(&self) -> Option<&EpochStats> {
        self.epochs.iter().fold(None, |best: Option<&EpochStats>, s| match best {
            Some(b) if b.val_accuracy >= s.val_accuracy => Some(b),
            _ => Some(s),
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}
