/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// L = -log(predicted[target] + eps) for a sparse (class index) target.
    pub fn loss(predicted: &[f64], target: usize) -> f64 {
        -(predicted[target] + EPS).ln()
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the logits:
    ///   ∂L/∂z_i = predicted[i] - onehot(target)[i]
    ///
    /// The Softmax layer's own derivative is identity (1.0) so this is not
    /// applied twice.
    pub fn derivative(predicted: &[f64], target: usize) -> Vec<f64> {
        predicted.iter().enumerate()
            .map(|(i, p)| if i == target { p - 1.0 } else { *p })
            .collect()
    }

    /// Class-weighted loss: `weight * L`. With balanced weights minority
    /// classes contribute proportionally more to each update.
    pub fn weighted_loss(predicted: &[f64], target: usize, weight: f64) -> f64 {
        weight * Self::loss(predicted, target)
    }

    /// Class-weighted gradient: `weight * ∂L/∂z`.
    pub fn weighted_derivative(predicted: &[f64], target: usize, weight: f64) -> Vec<f64> {
        Self::derivative(predicted, target).into_iter().map(|g| g * weight).collect()
    }
}
