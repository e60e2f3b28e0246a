pub mod confusion;
pub mod evaluator;
pub mod plot;
pub mod report;

pub use confusion::ConfusionMatrix;
pub use evaluator::{evaluate_network, evaluate_saved_model, Evaluation, Evaluator};
pub use report::{AverageMetrics, ClassMetrics, ClassificationReport};
