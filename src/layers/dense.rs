use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};

fn default_trainable() -> bool {
    true
}

/// Fully connected layer with an optional dropout on its output.
///
/// Forward passes cache the input, pre-activations and dropout mask so that
/// `compute_gradients` can run right after `feed_from` for the same sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub size: usize,
    pub input_size: usize,
    /// Shape `(input_size, size)`.
    pub weights: Matrix,
    pub biases: Vec<f64>,
    pub activator: ActivationFunction,
    /// Fraction of outputs zeroed while training (inverted dropout); 0 disables.
    #[serde(default)]
    pub dropout: f64,
    /// Frozen layers keep their parameters and receive no update.
    #[serde(default = "default_trainable")]
    pub trainable: bool,

    #[serde(skip)]
    last_input: Vec<f64>,
    #[serde(skip)]
    pre_neurons: Vec<f64>,
    #[serde(skip)]
    dropout_mask: Vec<f64>,
}

impl Layer {
    /// Creates a layer with He (ReLU family) or Xavier (everything else) weights
    /// and zero biases.
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = match activation {
            ActivationFunction::ReLU | ActivationFunction::ReLU6 => Matrix::he(input_size, size, rng),
            _ => Matrix::xavier(input_size, size, rng),
        };
        Layer::from_parts(weights, vec![0.0; size], activation)
    }

    /// Builds a layer around existing parameters.
    pub fn from_parts(weights: Matrix, biases: Vec<f64>, activation: ActivationFunction) -> Layer {
        assert_eq!(weights.cols, biases.len(), "bias length must equal layer size");
        Layer {
            size: weights.cols,
            input_size: weights.rows,
            weights,
            biases,
            activator: activation,
            dropout: 0.0,
            trainable: true,
            last_input: Vec::new(),
            pre_neurons: Vec::new(),
            dropout_mask: Vec::new(),
        }
    }

    pub fn with_dropout(mut self, rate: f64) -> Layer {
        self.dropout = rate;
        self
    }

    /// Forward pass. Dropout is only applied when `dropout_rng` is given
    /// (training mode).
    pub fn feed_from<R: Rng + ?Sized>(&mut self, input: Vec<f64>, dropout_rng: Option<&mut R>) -> Vec<f64> {
        let mut z = self.weights.vec_mul(&input);
        for (zi, b) in z.iter_mut().zip(&self.biases) {
            *zi += b;
        }
        let mut a = self.activator.apply(&z);

        self.dropout_mask.clear();
        if let Some(rng) = dropout_rng {
            if self.dropout > 0.0 {
                let keep = 1.0 - self.dropout;
                self.dropout_mask = (0..a.len())
                    .map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 })
                    .collect();
                for (ai, m) in a.iter_mut().zip(&self.dropout_mask) {
                    *ai *= m;
                }
            }
        }

        self.last_input = input;
        self.pre_neurons = z;
        a
    }

    /// Stateless inference pass; leaves the training caches untouched.
    pub fn infer(&self, input: &[f64]) -> Vec<f64> {
        let mut z = self.weights.vec_mul(input);
        for (zi, b) in z.iter_mut().zip(&self.biases) {
            *zi += b;
        }
        self.activator.apply(&z)
    }

    /// Back-propagates `output_delta` (∂L/∂a for this layer's output).
    ///
    /// Returns `(weights_grad, biases_grad, input_delta)` where `input_delta`
    /// is ∂L/∂a of the previous layer.
    pub fn compute_gradients(&self, output_delta: &[f64]) -> (Matrix, Vec<f64>, Vec<f64>) {
        let layer_delta: Vec<f64> = output_delta.iter().enumerate()
            .map(|(i, &d)| {
                let masked = if self.dropout_mask.is_empty() { d } else { d * self.dropout_mask[i] };
                masked * self.activator.derivative(self.pre_neurons[i])
            })
            .collect();

        let mut weights_grad = Matrix::zeros(self.input_size, self.size);
        weights_grad.add_outer(&self.last_input, &layer_delta, 1.0);
        let input_delta = self.weights.mul_vec(&layer_delta);

        (weights_grad, layer_delta, input_delta)
    }

    /// Plain gradient step scaled by `lr`.
    pub fn apply_gradients(&mut self, weights_grad: &Matrix, biases_grad: &[f64], lr: f64) {
        for (w, g) in self.weights.data.iter_mut().zip(&weights_grad.data) {
            *w -= lr * g;
        }
        for (b, g) in self.biases.iter_mut().zip(biases_grad) {
            *b -= lr * g;
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.data.len() + self.biases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn identity_layer() -> Layer {
        Layer::from_parts(
            Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]),
            vec![0.5, -0.5],
            ActivationFunction::Identity,
        )
    }

    #[test]
    fn feed_from_adds_bias() {
        let mut layer = identity_layer();
        let out = layer.feed_from::<StdRng>(vec![1.0, 2.0], None);
        assert_eq!(out, vec![1.5, 1.5]);
    }

    #[test]
    fn gradients_match_linear_layer() {
        let mut layer = identity_layer();
        layer.feed_from::<StdRng>(vec![1.0, 2.0], None);
        let (wg, bg, din) = layer.compute_gradients(&[1.0, -1.0]);
        assert_eq!(wg.data, vec![1.0, -1.0, 2.0, -2.0]);
        assert_eq!(bg, vec![1.0, -1.0]);
        assert_eq!(din, vec![1.0, -1.0]);
    }

    #[test]
    fn dropout_only_in_training_mode() {
        let mut layer = identity_layer().with_dropout(0.5);
        let eval = layer.feed_from::<StdRng>(vec![1.0, 2.0], None);
        assert_eq!(eval, vec![1.5, 1.5]);

        let mut rng = StdRng::seed_from_u64(3);
        let train = layer.feed_from(vec![1.0, 2.0], Some(&mut rng));
        assert!(train.iter().all(|&v| v == 0.0 || v == 3.0));
    }
}
