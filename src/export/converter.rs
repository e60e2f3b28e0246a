use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::activation::ActivationFunction;
use crate::error::ConversionError;
use crate::export::artifact::{ArtifactLayer, InferenceArtifact, TensorData};
use crate::export::calibration::CalibrationDataset;
use crate::export::quantize::{estimate_input_ranges, QuantizedTensor};
use crate::network::network::Network;

/// Operator set an artifact is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpSet {
    /// Integer-only kernels: dense plus the piecewise-linear activations and softmax.
    Int8Builtins,
    /// Float kernels for every activation.
    Builtins,
}

impl OpSet {
    pub fn supports(self, activation: ActivationFunction) -> bool {
        match self {
            OpSet::Builtins => true,
            OpSet::Int8Builtins => matches!(
                activation,
                ActivationFunction::ReLU
                    | ActivationFunction::ReLU6
                    | ActivationFunction::Identity
                    | ActivationFunction::Softmax
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpSet::Int8Builtins => "INT8_BUILTINS",
            OpSet::Builtins => "BUILTINS",
        }
    }
}

/// Settings for one conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub quantize: bool,
    pub op_set: OpSet,
}

impl ConversionOptions {
    /// Full int8 weights on integer kernels.
    pub fn quantized() -> Self {
        ConversionOptions { quantize: true, op_set: OpSet::Int8Builtins }
    }

    /// Float weights on the relaxed op set.
    pub fn float() -> Self {
        ConversionOptions { quantize: false, op_set: OpSet::Builtins }
    }
}

/// Turns a full-precision network into an inference artifact.
///
/// `calibration` is only consulted when `options.quantize` is set.
pub trait Converter {
    fn convert(
        &self,
        network: &Network,
        options: &ConversionOptions,
        calibration: Option<&CalibrationDataset>,
    ) -> Result<InferenceArtifact, ConversionError>;
}

/// The crate's own converter for dense networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConverter;

impl Converter for NativeConverter {
    fn convert(
        &self,
        network: &Network,
        options: &ConversionOptions,
        calibration: Option<&CalibrationDataset>,
    ) -> Result<InferenceArtifact, ConversionError> {
        for (i, layer) in network.layers.iter().enumerate() {
            if !options.op_set.supports(layer.activator) {
                return Err(ConversionError::UnsupportedOperator {
                    layer: i,
                    op: layer.activator.op_name().to_string(),
                    op_set: options.op_set.name().to_string(),
                });
            }
        }

        let layers = if options.quantize {
            let calibration = calibration.ok_or_else(|| {
                ConversionError::Calibration("quantized conversion needs a calibration dataset".into())
            })?;
            let ranges = estimate_input_ranges(&network.layers, calibration.iter())?;
            debug!(layers = ranges.len(), samples = calibration.len(), "estimated activation ranges");
            network.layers.iter().zip(&ranges)
                .map(|(layer, range)| {
                    let q = QuantizedTensor::quantize(&layer.weights.data);
                    ArtifactLayer {
                        input_size: layer.input_size,
                        size: layer.size,
                        weights: TensorData::Int8 { values: q.values, scale: q.scale },
                        biases: layer.biases.iter().map(|&b| b as f32).collect(),
                        activation: layer.activator,
                        input_quantization: Some(range.quantization()),
                    }
                })
                .collect()
        } else {
            network.layers.iter()
                .map(|layer| ArtifactLayer {
                    input_size: layer.input_size,
                    size: layer.size,
                    weights: TensorData::F32(layer.weights.data.iter().map(|&w| w as f32).collect()),
                    biases: layer.biases.iter().map(|&b| b as f32).collect(),
                    activation: layer.activator,
                    input_quantization: None,
                })
                .collect()
        };

        Ok(InferenceArtifact {
            op_set: options.op_set,
            quantized: options.quantize,
            layers,
            labels: network.metadata.output_labels.clone().unwrap_or_default(),
            image_size: network.metadata.image_size(),
        })
    }
}
