use std::path::Path;

use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{ensure_exists, PipelineError, Result};
use crate::layers::dense::Layer;
use crate::network::metadata::ModelMetadata;
use crate::train::train_config::BackboneMode;

/// A backbone (the first `backbone_len` layers) followed by a classification head.
///
/// This is the full-precision, trainable model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
    pub backbone_len: usize,
    #[serde(default)]
    pub metadata: ModelMetadata,
}

impl Network {
    pub fn new(layers: Vec<Layer>, backbone_len: usize) -> Network {
        assert!(backbone_len <= layers.len(), "backbone_len exceeds layer count");
        Network { layers, backbone_len, metadata: ModelMetadata::default() }
    }

    /// Inference forward pass (no dropout).
    pub fn forward(&mut self, input: Vec<f64>) -> Vec<f64> {
        let mut current = input;
        for layer in &mut self.layers {
            current = layer.feed_from::<StdRng>(current, None);
        }
        current
    }

    /// Training forward pass; dropout layers draw their masks from `rng`.
    pub fn forward_train(&mut self, input: Vec<f64>, rng: &mut StdRng) -> Vec<f64> {
        let mut current = input;
        for layer in &mut self.layers {
            current = layer.feed_from(current, Some(&mut *rng));
        }
        current
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size).unwrap_or(0)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.size).unwrap_or(0)
    }

    /// Drops the head, keeping only the backbone layers.
    pub fn into_backbone(mut self) -> Network {
        self.layers.truncate(self.backbone_len);
        self.metadata = ModelMetadata::default();
        self
    }

    /// Applies the freezing policy to the backbone. Head layers stay trainable.
    ///
    /// - `Frozen`: every backbone layer is frozen.
    /// - `FineTune { boundary }`: backbone layers `[0, boundary)` are frozen,
    ///   `[boundary, backbone_len)` are trainable.
    pub fn apply_backbone_mode(&mut self, mode: &BackboneMode) -> Result<()> {
        let boundary = match *mode {
            BackboneMode::Frozen => self.backbone_len,
            BackboneMode::FineTune { boundary } => {
                if boundary > self.backbone_len {
                    return Err(PipelineError::Config(format!(
                        "fine-tune boundary {} exceeds backbone depth {}",
                        boundary, self.backbone_len
                    )));
                }
                boundary
            }
        };
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.trainable = i >= boundary || i >= self.backbone_len;
        }
        self.metadata.backbone_mode = Some(mode.clone());
        debug!(
            frozen = boundary,
            trainable = self.layers.len() - boundary,
            "applied backbone mode"
        );
        Ok(())
    }

    pub fn trainable_mask(&self) -> Vec<bool> {
        self.layers.iter().map(|l| l.trainable).collect()
    }

    /// Index of the first trainable layer; back-propagation stops there.
    pub fn lowest_trainable(&self) -> Option<usize> {
        self.layers.iter().position(|l| l.trainable)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Checks that consecutive layer sizes line up.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(PipelineError::InvalidArtifact("network has no layers".into()));
        }
        if self.backbone_len > self.layers.len() {
            return Err(PipelineError::InvalidArtifact("backbone_len exceeds layer count".into()));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].size != pair[1].input_size {
                return Err(PipelineError::InvalidArtifact(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i, pair[0].size, i + 1, pair[1].input_size
                )));
            }
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.rows != layer.input_size
                || layer.weights.cols != layer.size
                || layer.biases.len() != layer.size
            {
                return Err(PipelineError::InvalidArtifact(format!(
                    "layer {} parameter shapes do not match its declared size",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Serializes the network to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Loads a network written by `save_json`. Fails with `MissingPath`
    /// before touching the file if it does not exist.
    pub fn load_json(path: &Path) -> Result<Network> {
        ensure_exists(path)?;
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader)
            .map_err(|e| PipelineError::InvalidArtifact(format!("{}: {}", path.display(), e)))?;
        network.validate()?;
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use rand::SeedableRng;

    fn stack(depth: usize, width: usize) -> Network {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layers: Vec<Layer> = (0..depth)
            .map(|_| Layer::new(width, width, ActivationFunction::ReLU6, &mut rng))
            .collect();
        layers.push(Layer::new(3, width, ActivationFunction::Softmax, &mut rng));
        Network::new(layers, depth)
    }

    #[test]
    fn fine_tune_boundary_100_of_154() {
        let mut net = stack(154, 2);
        net.apply_backbone_mode(&BackboneMode::FineTune { boundary: 100 }).unwrap();
        let mask = net.trainable_mask();
        assert!(mask[..100].iter().all(|t| !t));
        assert!(mask[100..154].iter().all(|&t| t));
        assert!(mask[154], "head stays trainable");
        assert_eq!(net.lowest_trainable(), Some(100));
    }

    #[test]
    fn frozen_mode_leaves_only_head_trainable() {
        let mut net = stack(4, 2);
        net.apply_backbone_mode(&BackboneMode::Frozen).unwrap();
        assert_eq!(net.trainable_mask(), vec![false, false, false, false, true]);
    }

    #[test]
    fn boundary_past_backbone_is_rejected() {
        let mut net = stack(4, 2);
        let err = net.apply_backbone_mode(&BackboneMode::FineTune { boundary: 5 }).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn json_round_trip_keeps_freeze_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut net = stack(3, 4);
        net.apply_backbone_mode(&BackboneMode::FineTune { boundary: 2 }).unwrap();
        net.save_json(&path).unwrap();

        let mut loaded = Network::load_json(&path).unwrap();
        assert_eq!(loaded.trainable_mask(), net.trainable_mask());
        let input = vec![0.1, -0.2, 0.3, 0.4];
        assert_eq!(loaded.forward(input.clone()), net.forward(input));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Network::load_json(Path::new("no/such/model.json")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingPath(_)));
    }
}
