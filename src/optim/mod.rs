pub mod adam;
pub mod sgd;

use serde::{Deserialize, Serialize};

use crate::{layers::dense::Layer, math::matrix::Matrix};

pub use adam::Adam;
pub use sgd::Sgd;

/// Parameter update rule with an adjustable learning rate (the trainer's
/// plateau scheduler lowers it between epochs).
pub trait Optimizer {
    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, lr: f64);
    /// Applies one update to `layer` (identified by its index in the network).
    fn step(&mut self, layer_index: usize, layer: &mut Layer, weights_grad: &Matrix, biases_grad: &[f64]);
}

/// Optimizer selection for a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
        }
    }
}
