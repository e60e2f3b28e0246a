use std::path::Path;

use serde::Serialize;

use crate::dataset::image::{load_rgb, to_input};
use crate::error::{PipelineError, Result};
use crate::inference::labels::read_labels;
use crate::inference::model::InferenceModel;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// One class and its probability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub confidence: f64,
}

/// An inference model paired with its class names.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: InferenceModel,
    labels: Vec<String>,
    /// The top class must exceed this probability to be reported.
    pub threshold: f64,
}

impl Classifier {
    pub fn new(model: InferenceModel, labels: Vec<String>) -> Result<Classifier> {
        if labels.len() != model.output_size() {
            return Err(PipelineError::ClassMismatch(format!(
                "{} labels for a model with {} outputs",
                labels.len(),
                model.output_size()
            )));
        }
        Ok(Classifier { model, labels, threshold: DEFAULT_THRESHOLD })
    }

    /// Loads the artifact and its label file.
    pub fn load(artifact: &Path, labels: &Path) -> Result<Classifier> {
        let model = InferenceModel::load(artifact)?;
        Classifier::new(model, read_labels(labels)?)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Classifier {
        self.threshold = threshold;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Every class, most probable first.
    pub fn classify_all(&self, input: &[f64]) -> Result<Vec<Prediction>> {
        let probs = self.model.forward(input)?;
        let mut predictions: Vec<Prediction> = probs.into_iter().enumerate()
            .map(|(index, confidence)| Prediction { index, label: self.labels[index].clone(), confidence })
            .collect();
        predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(predictions)
    }

    /// The top class if its probability exceeds the threshold, else `None`.
    pub fn classify(&self, input: &[f64]) -> Result<Option<Prediction>> {
        Ok(self.decide(&self.classify_all(input)?))
    }

    /// Applies the threshold to an already ranked list.
    pub fn decide(&self, ranked: &[Prediction]) -> Option<Prediction> {
        ranked.first().filter(|p| p.confidence > self.threshold).cloned()
    }

    /// Decodes an image at the artifact's input size and returns every class ranked.
    pub fn classify_image(&self, path: &Path) -> Result<Vec<Prediction>> {
        let size = self.model.artifact.image_size.ok_or_else(|| {
            PipelineError::InvalidArtifact("artifact does not record an image input size".into())
        })?;
        let img = load_rgb(path, size)?;
        self.classify_all(&to_input(&img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::export::converter::{ConversionOptions, Converter, NativeConverter};
    use crate::layers::dense::Layer;
    use crate::math::matrix::Matrix;
    use crate::network::network::Network;

    fn classifier() -> Classifier {
        let network = Network::new(
            vec![Layer::from_parts(
                Matrix::from_vec(3, 3, vec![4.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0]),
                vec![0.0; 3],
                ActivationFunction::Softmax,
            )],
            0,
        );
        let artifact = NativeConverter.convert(&network, &ConversionOptions::float(), None).unwrap();
        let labels = vec!["healthy".into(), "mites".into(), "blight".into()];
        Classifier::new(InferenceModel { artifact }, labels).unwrap()
    }

    #[test]
    fn confident_input_is_classified() {
        let p = classifier().classify(&[0.0, 1.0, 0.0]).unwrap().unwrap();
        assert_eq!(p.label, "mites");
        assert!(p.confidence > 0.9);
    }

    #[test]
    fn ambiguous_input_is_undecided() {
        assert_eq!(classifier().classify(&[1.0, 1.0, 0.0]).unwrap(), None);
    }

    #[test]
    fn decision_respects_the_threshold() {
        let c = classifier();
        let ranked = c.classify_all(&[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(c.decide(&ranked).map(|p| p.index), Some(2));
        let strict = c.with_threshold(0.999);
        assert_eq!(strict.decide(&ranked), None);
        assert_eq!(strict.decide(&[]), None);
    }

    #[test]
    fn classify_all_is_sorted() {
        let all = classifier().classify_all(&[0.1, 0.0, 0.5]).unwrap();
        assert_eq!(all.iter().map(|p| p.index).collect::<Vec<_>>(), vec![2, 0, 1]);
        assert!((all.iter().map(|p| p.confidence).sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn label_count_must_match_outputs() {
        let c = classifier();
        let err = Classifier::new(c.model.clone(), vec!["a".into()]).unwrap_err();
        assert!(matches!(err, PipelineError::ClassMismatch(_)));
    }
}
