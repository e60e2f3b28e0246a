use std::path::Path;

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::export::artifact::{ArtifactLayer, InferenceArtifact, TensorData};

/// Runs an exported artifact. Quantized layers use int8 inputs and weights
/// with i32 accumulation; float layers run in f32.
#[derive(Debug, Clone)]
pub struct InferenceModel {
    pub artifact: InferenceArtifact,
}

impl InferenceModel {
    pub fn load(path: &Path) -> Result<InferenceModel> {
        let artifact = InferenceArtifact::load(path)?;
        info!(
            path = %path.display(),
            quantized = artifact.quantized,
            op_set = artifact.op_set.name(),
            layers = artifact.layers.len(),
            "loaded inference artifact"
        );
        Ok(InferenceModel { artifact })
    }

    pub fn input_size(&self) -> usize {
        self.artifact.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.artifact.output_size()
    }

    /// Class probabilities for one input.
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_size() {
            return Err(PipelineError::Config(format!(
                "model expects {} inputs, got {}",
                self.input_size(),
                input.len()
            )));
        }
        let mut current = input.to_vec();
        for layer in &self.artifact.layers {
            current = run_layer(layer, &current);
        }
        Ok(current)
    }
}

fn run_layer(layer: &ArtifactLayer, input: &[f64]) -> Vec<f64> {
    let mut z = vec![0.0f64; layer.size];
    match (&layer.weights, &layer.input_quantization) {
        (TensorData::Int8 { values, scale }, Some(aq)) => {
            let xq: Vec<i32> = input.iter().map(|&x| aq.quantize(x) as i32 - aq.zero_point).collect();
            let mut acc = vec![0i32; layer.size];
            for (i, &x) in xq.iter().enumerate() {
                if x == 0 {
                    continue;
                }
                let row = &values[i * layer.size..(i + 1) * layer.size];
                for (a, &w) in acc.iter_mut().zip(row) {
                    *a += x * w as i32;
                }
            }
            let out_scale = aq.scale as f64 * *scale as f64;
            for (zj, a) in z.iter_mut().zip(acc) {
                *zj = a as f64 * out_scale;
            }
        }
        (TensorData::Int8 { values, scale }, None) => {
            for (i, &x) in input.iter().enumerate() {
                let row = &values[i * layer.size..(i + 1) * layer.size];
                for (zj, &w) in z.iter_mut().zip(row) {
                    *zj += x * (w as f64 * *scale as f64);
                }
            }
        }
        (TensorData::F32(values), _) => {
            for (i, &x) in input.iter().enumerate() {
                let row = &values[i * layer.size..(i + 1) * layer.size];
                for (zj, &w) in z.iter_mut().zip(row) {
                    *zj += x * w as f64;
                }
            }
        }
    }
    for (zj, &b) in z.iter_mut().zip(&layer.biases) {
        *zj += b as f64;
    }
    layer.activation.apply(&z)
}
