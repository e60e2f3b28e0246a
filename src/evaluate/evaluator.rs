use std::path::{Path, PathBuf};

use tracing::info;

use crate::dataset::partition::Partition;
use crate::dataset::tensor_set::{DecodedPartition, TensorSet};
use crate::error::{ensure_exists, PipelineError, Result};
use crate::evaluate::confusion::ConfusionMatrix;
use crate::evaluate::plot::save_confusion_png;
use crate::evaluate::report::ClassificationReport;
use crate::math::argmax;
use crate::network::network::Network;

pub const REPORT_FILE: &str = "classification_report.txt";
pub const CONFUSION_FILE: &str = "confusion_matrix.png";

/// Predictions of one evaluation pass, in sample order.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub predictions: Vec<usize>,
    pub truths: Vec<usize>,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

impl Evaluation {
    /// Report followed by the confusion grid and the index → class legend,
    /// as written to the report file.
    pub fn render_text(&self) -> String {
        let mut text = self.report.to_string();
        text.push_str("\nConfusion matrix (rows: true class, columns: predicted class)\n\n");
        text.push_str(&self.confusion.to_string());
        text.push_str("\nClass index\n\n");
        for (index, class) in self.report.classes.iter().enumerate() {
            text.push_str(&format!("{:>4}  {}\n", index, class.name));
        }
        text
    }
}

/// Runs `network` over every sample of `set` in order (no shuffling).
///
/// Fails with `ClassMismatch` if the network's output count differs from the
/// set's class count or from `class_names`.
pub fn evaluate_network(network: &mut Network, set: &TensorSet, class_names: &[String]) -> Result<Evaluation> {
    if network.output_size() != set.n_classes || class_names.len() != set.n_classes {
        return Err(PipelineError::ClassMismatch(format!(
            "model predicts {} classes but the evaluation data has {} ({} names)",
            network.output_size(), set.n_classes, class_names.len()
        )));
    }
    let predictions: Vec<usize> = set.inputs.iter()
        .map(|input| argmax(&network.forward(input.clone())))
        .collect();
    let confusion = ConfusionMatrix::from_predictions(&predictions, &set.labels, set.n_classes);
    let report = ClassificationReport::from_confusion(&confusion, class_names);
    Ok(Evaluation { predictions, truths: set.labels.clone(), confusion, report })
}

/// Evaluates a saved full-precision model against a held-out partition and
/// writes the text report and the confusion-matrix heatmap.
#[derive(Debug, Clone)]
pub struct Evaluator {
    pub model_path: PathBuf,
    pub test_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Used when the model carries no input metadata.
    pub default_image_size: u32,
}

impl Evaluator {
    pub fn run(&self) -> Result<Evaluation> {
        ensure_exists(&self.model_path)?;
        let mut network = Network::load_json(&self.model_path)?;
        info!(path = %self.model_path.display(), "loaded model for evaluation");

        let partition = Partition::scan(&self.test_dir)?;
        if let Some(labels) = &network.metadata.output_labels {
            if labels != &partition.class_names {
                return Err(PipelineError::ClassMismatch(format!(
                    "model was trained on {:?} but '{}' has {:?}",
                    labels, self.test_dir.display(), partition.class_names
                )));
            }
        }

        let size = network.metadata.image_size().unwrap_or(self.default_image_size);
        let set = DecodedPartition::load(&partition, size)?.tensors();
        if set.input_len() != network.input_size() {
            return Err(PipelineError::Config(format!(
                "model expects {} inputs but {}x{} images yield {}",
                network.input_size(), size, size, set.input_len()
            )));
        }

        let evaluation = evaluate_network(&mut network, &set, &partition.class_names)?;
        info!(
            samples = evaluation.confusion.total(),
            accuracy = evaluation.report.accuracy,
            "evaluation complete"
        );

        self.write_outputs(&evaluation)?;
        Ok(evaluation)
    }

    fn write_outputs(&self, evaluation: &Evaluation) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)?;
        let report_path = self.out_dir.join(REPORT_FILE);
        std::fs::write(&report_path, evaluation.render_text())?;
        let plot_path = self.out_dir.join(CONFUSION_FILE);
        save_confusion_png(&evaluation.confusion, &plot_path)?;
        info!(report = %report_path.display(), plot = %plot_path.display(), "wrote evaluation outputs");
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.out_dir.join(REPORT_FILE)
    }

    pub fn confusion_path(&self) -> PathBuf {
        self.out_dir.join(CONFUSION_FILE)
    }
}

/// Convenience for callers holding borrowed paths.
pub fn evaluate_saved_model(model_path: &Path, test_dir: &Path, out_dir: &Path, default_image_size: u32) -> Result<Evaluation> {
    Evaluator {
        model_path: model_path.to_path_buf(),
        test_dir: test_dir.to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        default_image_size,
    }
    .run()
}
