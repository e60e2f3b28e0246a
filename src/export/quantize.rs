//! Int8 quantization primitives.
//!
//! Weights use symmetric per-tensor quantization (`w ≈ q · scale`, q in
//! [-127, 127]). Activations use asymmetric per-tensor quantization
//! (`x ≈ (q - zero_point) · scale`, q in [-128, 127]) over a range that
//! always contains zero.

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;
use crate::layers::dense::Layer;

/// Symmetrically quantized tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    pub values: Vec<i8>,
    pub scale: f32,
}

impl QuantizedTensor {
    pub fn quantize(data: &[f64]) -> QuantizedTensor {
        let max_abs = data.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 1.0 };
        let values = data.iter()
            .map(|&x| (x / scale).round().clamp(-127.0, 127.0) as i8)
            .collect();
        QuantizedTensor { values, scale: scale as f32 }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        self.values.iter().map(|&q| q as f32 * self.scale).collect()
    }
}

/// Observed min / max of one activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationRange {
    pub min: f64,
    pub max: f64,
}

impl ActivationRange {
    fn empty() -> Self {
        ActivationRange { min: 0.0, max: 0.0 }
    }

    fn observe(&mut self, values: &[f64]) {
        for &v in values {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
    }

    /// Affine int8 parameters covering this range.
    pub fn quantization(&self) -> ActivationQuantization {
        let span = self.max - self.min;
        let scale = if span > 0.0 { span / 255.0 } else { 1.0 };
        let zero_point = (-128.0 - self.min / scale).round().clamp(-128.0, 127.0) as i32;
        ActivationQuantization { scale: scale as f32, zero_point }
    }
}

/// Affine int8 mapping of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationQuantization {
    pub scale: f32,
    pub zero_point: i32,
}

impl ActivationQuantization {
    pub fn quantize(&self, x: f64) -> i8 {
        ((x / self.scale as f64).round() + self.zero_point as f64).clamp(-128.0, 127.0) as i8
    }
}

/// Runs every calibration input through `layers` in full precision and
/// records the range of each layer's input.
///
/// Entry `i` of the result is the range seen at the input of layer `i`.
pub fn estimate_input_ranges<I>(layers: &[Layer], samples: I) -> Result<Vec<ActivationRange>, ConversionError>
where
    I: IntoIterator<Item = Vec<f64>>,
{
    let mut ranges = vec![ActivationRange::empty(); layers.len()];
    let mut seen = 0usize;
    for sample in samples {
        let mut current = sample;
        for (range, layer) in ranges.iter_mut().zip(layers) {
            if current.len() != layer.input_size {
                return Err(ConversionError::Calibration(format!(
                    "calibration input has {} values but the layer expects {}",
                    current.len(), layer.input_size
                )));
            }
            range.observe(&current);
            current = layer.infer(&current);
        }
        if current.iter().any(|x| !x.is_finite()) {
            return Err(ConversionError::Calibration("non-finite activation observed".into()));
        }
        seen += 1;
    }
    if seen == 0 {
        return Err(ConversionError::Calibration("no calibration samples were provided".into()));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::math::matrix::Matrix;

    #[test]
    fn weights_round_trip_within_half_a_step() {
        let data = [0.5, -1.27, 0.0, 0.3333];
        let q = QuantizedTensor::quantize(&data);
        assert_eq!(q.values[1], -127);
        for (orig, deq) in data.iter().zip(q.dequantize()) {
            assert!((orig - deq as f64).abs() <= q.scale as f64 / 2.0 + 1e-6);
        }
    }

    #[test]
    fn activation_range_always_contains_zero() {
        let mut r = ActivationRange::empty();
        r.observe(&[2.0, 6.0]);
        assert_eq!(r.min, 0.0);
        let aq = r.quantization();
        assert_eq!(aq.quantize(0.0) as i32, aq.zero_point);
        assert_eq!(aq.quantize(6.0), 127);
    }

    #[test]
    fn ranges_track_each_layer_input() {
        let layer = Layer::from_parts(Matrix::from_vec(1, 1, vec![2.0]), vec![0.0], ActivationFunction::ReLU);
        let second = Layer::from_parts(Matrix::from_vec(1, 1, vec![1.0]), vec![0.0], ActivationFunction::Identity);
        let ranges = estimate_input_ranges(&[layer, second], vec![vec![-1.0], vec![3.0]]).unwrap();
        assert_eq!(ranges[0], ActivationRange { min: -1.0, max: 3.0 });
        assert_eq!(ranges[1], ActivationRange { min: 0.0, max: 6.0 });
    }

    #[test]
    fn no_samples_is_a_calibration_error() {
        let layer = Layer::from_parts(Matrix::from_vec(1, 1, vec![1.0]), vec![0.0], ActivationFunction::ReLU);
        let err = estimate_input_ranges(&[layer], Vec::new()).unwrap_err();
        assert!(matches!(err, ConversionError::Calibration(_)));
    }
}
