use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    /// ReLU clipped at 6, the backbone nonlinearity of MobileNet-style networks.
    ReLU6,
    Identity,
    Sigmoid,
    Tanh,
    /// Vector-valued; applied to the whole layer output by `Layer::feed_from()`.
    Softmax,
}

impl ActivationFunction {
    /// Element-wise activation.
    ///
    /// # Panics
    /// Panics for `Softmax`, which only makes sense over a full vector; use
    /// [`softmax`] instead.
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => x.max(0.0),
            ActivationFunction::ReLU6 => x.clamp(0.0, 6.0),
            ActivationFunction::Identity => x,
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Softmax => {
                panic!("ActivationFunction::Softmax::function() must not be called directly; \
                        use activation::softmax() on the whole layer output.")
            }
        }
    }

    /// Element-wise derivative evaluated at the pre-activation `x`.
    ///
    /// `Softmax` returns 1.0: it is always paired with cross-entropy, whose
    /// derivative (`predicted - expected`) is already taken w.r.t. the logits.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::ReLU6 => if x > 0.0 && x < 6.0 { 1.0 } else { 0.0 },
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Softmax => 1.0,
        }
    }

    /// Applies the activation to a full pre-activation vector.
    pub fn apply(&self, z: &[f64]) -> Vec<f64> {
        match self {
            ActivationFunction::Softmax => softmax(z),
            other => z.iter().map(|&x| other.function(x)).collect(),
        }
    }

    /// Short operator name used in artifacts and diagnostics.
    pub fn op_name(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "RELU",
            ActivationFunction::ReLU6 => "RELU6",
            ActivationFunction::Identity => "IDENTITY",
            ActivationFunction::Sigmoid => "LOGISTIC",
            ActivationFunction::Tanh => "TANH",
            ActivationFunction::Softmax => "SOFTMAX",
        }
    }
}

/// Numerically stable softmax (max-shifted).
pub fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = z.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
