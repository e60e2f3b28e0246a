pub mod classifier;
pub mod history;
pub mod labels;
pub mod model;

pub use classifier::{Classifier, Prediction, DEFAULT_THRESHOLD};
pub use history::{Detection, DetectionHistory};
pub use labels::{read_labels, write_labels};
pub use model::InferenceModel;
