use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{PipelineError, Result};
use crate::layers::dense::Layer;
use crate::network::network::Network;

/// Architecture of a backbone built from scratch (used when no pretrained
/// backbone artifact is configured).
///
/// - `widths`     — output size of each backbone layer, input → output
/// - `activation` — nonlinearity shared by every backbone layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackboneSpec {
    pub widths: Vec<usize>,
    pub activation: ActivationFunction,
}

impl Default for BackboneSpec {
    fn default() -> Self {
        BackboneSpec { widths: vec![128, 64], activation: ActivationFunction::ReLU6 }
    }
}

/// Classification head stacked on the backbone's feature vector:
/// Dense(hidden_units, ReLU) → Dropout(dropout) → Dense(n_classes, Softmax).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadSpec {
    pub hidden_units: usize,
    pub dropout: f64,
}

impl Default for HeadSpec {
    fn default() -> Self {
        HeadSpec { hidden_units: 128, dropout: 0.5 }
    }
}

impl HeadSpec {
    /// Builds the head layers for a backbone emitting `feature_size` values.
    pub fn build<R: Rng + ?Sized>(&self, feature_size: usize, n_classes: usize, rng: &mut R) -> Vec<Layer> {
        vec![
            Layer::new(self.hidden_units, feature_size, ActivationFunction::ReLU, rng)
                .with_dropout(self.dropout),
            Layer::new(n_classes, self.hidden_units, ActivationFunction::Softmax, rng),
        ]
    }
}

/// A serializable description of the complete classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Flattened input length (image_size² × 3 for RGB images).
    pub input_size: usize,
    pub n_classes: usize,
    #[serde(default)]
    pub backbone: BackboneSpec,
    #[serde(default)]
    pub head: HeadSpec,
}

impl NetworkSpec {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(PipelineError::Config("input_size must be positive".into()));
        }
        if self.n_classes < 2 {
            return Err(PipelineError::Config(format!(
                "a classifier needs at least 2 classes, got {}",
                self.n_classes
            )));
        }
        if self.backbone.widths.iter().any(|&w| w == 0) || self.head.hidden_units == 0 {
            return Err(PipelineError::Config("layer widths must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.head.dropout) {
            return Err(PipelineError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.head.dropout
            )));
        }
        Ok(())
    }

    /// Builds a freshly initialized backbone + head.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Network> {
        self.validate()?;
        let mut layers = Vec::with_capacity(self.backbone.widths.len() + 2);
        let mut fan_in = self.input_size;
        for &width in &self.backbone.widths {
            layers.push(Layer::new(width, fan_in, self.backbone.activation, rng));
            fan_in = width;
        }
        let backbone_len = layers.len();
        layers.extend(self.head.build(fan_in, self.n_classes, rng));
        Ok(Network::new(layers, backbone_len))
    }

    /// Stacks a fresh head on a pretrained network's backbone; the pretrained
    /// head (if any) is discarded.
    pub fn attach_head<R: Rng + ?Sized>(&self, pretrained: Network, rng: &mut R) -> Result<Network> {
        self.validate()?;
        let backbone = pretrained.into_backbone();
        if backbone.layers.is_empty() {
            return Err(PipelineError::InvalidArtifact("pretrained artifact has no backbone layers".into()));
        }
        if backbone.input_size() != self.input_size {
            return Err(PipelineError::Config(format!(
                "pretrained backbone expects {} inputs but the image size yields {}",
                backbone.input_size(),
                self.input_size
            )));
        }
        let feature_size = backbone.output_size();
        let backbone_len = backbone.layers.len();
        let mut layers = backbone.layers;
        layers.extend(self.head.build(feature_size, self.n_classes, rng));
        Ok(Network::new(layers, backbone_len))
    }
}
