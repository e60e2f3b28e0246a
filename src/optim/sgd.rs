use crate::{math::matrix::Matrix, layers::dense::Layer};
use crate::optim::Optimizer;

/// Plain stochastic gradient descent.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn step(&mut self, _layer_index: usize, layer: &mut Layer, weights_grad: &Matrix, biases_grad: &[f64]) {
        layer.apply_gradients(weights_grad, biases_grad, self.learning_rate);
    }
}
