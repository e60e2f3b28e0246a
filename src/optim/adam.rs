use std::collections::HashMap;

use crate::{math::matrix::Matrix, layers::dense::Layer};
use crate::optim::Optimizer;

/// First/second moment estimates for one layer.
struct Moments {
    m_w: Vec<f64>,
    v_w: Vec<f64>,
    m_b: Vec<f64>,
    v_b: Vec<f64>,
    t: i32,
}

impl Moments {
    fn for_layer(layer: &Layer) -> Moments {
        let nw = layer.weights.data.len();
        let nb = layer.biases.len();
        Moments { m_w: vec![0.0; nw], v_w: vec![0.0; nw], m_b: vec![0.0; nb], v_b: vec![0.0; nb], t: 0 }
    }
}

/// Adam with bias correction (β1 = 0.9, β2 = 0.999, ε = 1e-7).
///
/// Moments are allocated lazily per layer index, so frozen layers never
/// cost memory.
pub struct Adam {
    pub learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<usize, Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam { learning_rate, beta1: 0.9, beta2: 0.999, epsilon: 1e-7, state: HashMap::new() }
    }
}

fn adam_update(params: &mut [f64], grads: &[f64], m: &mut [f64], v: &mut [f64], lr_t: f64, b1: f64, b2: f64, eps: f64) {
    for i in 0..params.len() {
        let g = grads[i];
        m[i] = b1 * m[i] + (1.0 - b1) * g;
        v[i] = b2 * v[i] + (1.0 - b2) * g * g;
        params[i] -= lr_t * m[i] / (v[i].sqrt() + eps);
    }
}

impl Optimizer for Adam {
    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn step(&mut self, layer_index: usize, layer: &mut Layer, weights_grad: &Matrix, biases_grad: &[f64]) {
        let moments = self.state.entry(layer_index).or_insert_with(|| Moments::for_layer(layer));
        moments.t += 1;
        let lr_t = self.learning_rate * (1.0 - self.beta2.powi(moments.t)).sqrt()
            / (1.0 - self.beta1.powi(moments.t));
        adam_update(&mut layer.weights.data, &weights_grad.data, &mut moments.m_w, &mut moments.v_w,
                    lr_t, self.beta1, self.beta2, self.epsilon);
        adam_update(&mut layer.biases, biases_grad, &mut moments.m_b, &mut moments.v_b,
                    lr_t, self.beta1, self.beta2, self.epsilon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut layer = Layer::from_parts(Matrix::from_vec(1, 1, vec![1.0]), vec![0.0], ActivationFunction::Identity);
        let mut adam = Adam::new(0.1);
        adam.step(0, &mut layer, &Matrix::from_vec(1, 1, vec![4.0]), &[-2.0]);
        // Bias-corrected first step is ≈ lr * sign(g).
        assert!((layer.weights.data[0] - 0.9).abs() < 1e-6);
        assert!((layer.biases[0] - 0.1).abs() < 1e-6);
    }
}
