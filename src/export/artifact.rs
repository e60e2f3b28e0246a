//! Binary inference artifact (`.tlnn`).
//!
//! Layout: 4-byte magic `TLNN`, little-endian `u32` format version, then the
//! bincode-encoded [`InferenceArtifact`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{ensure_exists, ConversionError, PipelineError, Result};
use crate::export::converter::OpSet;
use crate::export::quantize::ActivationQuantization;

pub const MAGIC: &[u8; 4] = b"TLNN";
pub const FORMAT_VERSION: u32 = 1;

/// Weight storage of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    F32(Vec<f32>),
    /// Symmetric per-tensor int8.
    Int8 { values: Vec<i8>, scale: f32 },
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::Int8 { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One dense layer in inference form. Weights are `(input_size, size)` row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLayer {
    pub input_size: usize,
    pub size: usize,
    pub weights: TensorData,
    pub biases: Vec<f32>,
    pub activation: ActivationFunction,
    /// Present on quantized layers: how the float input is mapped to int8.
    pub input_quantization: Option<ActivationQuantization>,
}

/// A converted, inference-only model. Input and output are always float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceArtifact {
    pub op_set: OpSet,
    pub quantized: bool,
    pub layers: Vec<ArtifactLayer>,
    /// Class names in output order (empty when unknown).
    pub labels: Vec<String>,
    /// Square RGB input side, when the model takes images.
    pub image_size: Option<u32>,
}

impl InferenceArtifact {
    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.input_size).unwrap_or(0)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.size).unwrap_or(0)
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, ConversionError> {
        let body = bincode::serialize(self).map_err(|e| ConversionError::Encode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(8 + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<InferenceArtifact> {
        if bytes.len() < 8 || &bytes[..4] != MAGIC {
            return Err(PipelineError::InvalidArtifact("missing TLNN header".into()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(PipelineError::InvalidArtifact(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        let artifact: InferenceArtifact = bincode::deserialize(&bytes[8..])
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> Result<InferenceArtifact> {
        ensure_exists(path)?;
        let bytes = std::fs::read(path)?;
        InferenceArtifact::from_bytes(&bytes)
            .map_err(|e| PipelineError::InvalidArtifact(format!("{}: {}", path.display(), e)))
    }

    fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(PipelineError::InvalidArtifact("artifact has no layers".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.input_size * layer.size || layer.biases.len() != layer.size {
                return Err(PipelineError::InvalidArtifact(format!("layer {} has inconsistent shapes", i)));
            }
            if i > 0 && self.layers[i - 1].size != layer.input_size {
                return Err(PipelineError::InvalidArtifact(format!(
                    "layer {} expects {} inputs but the previous layer emits {}",
                    i, layer.input_size, self.layers[i - 1].size
                )));
            }
        }
        if !self.labels.is_empty() && self.labels.len() != self.output_size() {
            return Err(PipelineError::InvalidArtifact(format!(
                "{} labels for {} outputs",
                self.labels.len(),
                self.output_size()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> InferenceArtifact {
        InferenceArtifact {
            op_set: OpSet::Builtins,
            quantized: false,
            layers: vec![ArtifactLayer {
                input_size: 2,
                size: 1,
                weights: TensorData::F32(vec![0.5, -0.5]),
                biases: vec![0.1],
                activation: ActivationFunction::Identity,
                input_quantization: None,
            }],
            labels: vec!["only".into()],
            image_size: None,
        }
    }

    #[test]
    fn header_is_checked() {
        let mut bytes = tiny().to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"TLNN");
        assert_eq!(InferenceArtifact::from_bytes(&bytes).unwrap(), tiny());

        bytes[4] = 9;
        assert!(matches!(InferenceArtifact::from_bytes(&bytes), Err(PipelineError::InvalidArtifact(_))));
        assert!(InferenceArtifact::from_bytes(b"{\"layers\":[]}").is_err());
    }

    #[test]
    fn load_names_missing_file() {
        let err = InferenceArtifact::load(Path::new("out/model.tlnn")).unwrap_err();
        assert!(err.to_string().contains("model.tlnn"));
    }
}
