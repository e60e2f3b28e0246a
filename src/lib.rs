pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod dataset;
pub mod evaluate;
pub mod export;
pub mod inference;
pub mod config;
pub mod error;
pub mod logging;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::Network;
pub use network::spec::NetworkSpec;
pub use train::{BackboneMode, ClassWeightTable, TrainConfig, Trainer};
pub use evaluate::{ConfusionMatrix, ClassificationReport, Evaluator};
pub use export::{ExportConfig, ExportMode, ExportReport, Exporter};
pub use inference::{Classifier, InferenceModel};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
