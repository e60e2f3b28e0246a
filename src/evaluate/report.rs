use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluate::confusion::ConfusionMatrix;

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of samples whose true class this is.
    pub support: usize,
}

impl ClassMetrics {
    /// Undefined ratios (zero denominators) are reported as 0.
    pub fn from_confusion(matrix: &ConfusionMatrix, class: usize, name: &str) -> Self {
        let tp = matrix.true_positives(class) as f64;
        let fp = matrix.false_positives(class) as f64;
        let fn_ = matrix.false_negatives(class) as f64;

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = ratio(2.0 * precision * recall, precision + recall);

        ClassMetrics { name: name.to_string(), precision, recall, f1, support: matrix.support(class) }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// An averaged precision / recall / F1 row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class metrics plus accuracy, macro and support-weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

impl ClassificationReport {
    /// # Panics
    /// Panics if `class_names.len()` differs from the matrix's class count.
    pub fn from_confusion(matrix: &ConfusionMatrix, class_names: &[String]) -> Self {
        assert_eq!(class_names.len(), matrix.n_classes, "one name per class is required");
        let classes: Vec<ClassMetrics> = class_names.iter().enumerate()
            .map(|(c, name)| ClassMetrics::from_confusion(matrix, c, name))
            .collect();

        let total = matrix.total();
        let n = classes.len().max(1) as f64;
        let macro_avg = AverageMetrics {
            precision: classes.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: classes.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: classes.iter().map(|m| m.f1).sum::<f64>() / n,
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            ratio(classes.iter().map(|m| f(m) * m.support as f64).sum(), total as f64)
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
        };

        ClassificationReport {
            accuracy: ratio(matrix.correct() as f64, total as f64),
            classes,
            macro_avg,
            weighted_avg,
            total,
        }
    }
}

/// Column layout familiar from scikit-learn's `classification_report`.
impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.classes.iter()
            .map(|m| m.name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(0);

        writeln!(f, "{:>width$} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support", width = width)?;
        writeln!(f)?;
        for m in &self.classes {
            writeln!(f, "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                     m.name, m.precision, m.recall, m.f1, m.support, width = width)?;
        }
        writeln!(f)?;
        writeln!(f, "{:>width$} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, self.total, width = width)?;
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(f, "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                     label, avg.precision, avg.recall, avg.f1, self.total, width = width)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn per_class_and_averages() {
        // truth:     0 0 0 0 1 1
        // predicted: 0 0 0 1 1 0
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 0, 1, 1, 0], &[0, 0, 0, 0, 1, 1], 2);
        let report = ClassificationReport::from_confusion(&cm, &names(&["healthy", "mites"]));

        let healthy = &report.classes[0];
        assert!((healthy.precision - 0.75).abs() < 1e-12);
        assert!((healthy.recall - 0.75).abs() < 1e-12);
        assert_eq!(healthy.support, 4);

        let mites = &report.classes[1];
        assert!((mites.precision - 0.5).abs() < 1e-12);
        assert!((mites.recall - 0.5).abs() < 1e-12);

        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert!((report.macro_avg.f1 - 0.625).abs() < 1e-12);
        assert!((report.weighted_avg.recall - (0.75 * 4.0 + 0.5 * 2.0) / 6.0).abs() < 1e-12);
    }

    #[test]
    fn never_predicted_class_scores_zero() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0], &[0, 1], 2);
        let report = ClassificationReport::from_confusion(&cm, &names(&["a", "b"]));
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
    }

    #[test]
    fn text_layout_has_every_row() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1], &[0, 1], 2);
        let text = ClassificationReport::from_confusion(&cm, &names(&["Tomato___healthy", "spider_mites"])).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("precision") && lines[0].contains("support"));
        assert!(text.contains("Tomato___healthy      1.00      1.00      1.00         1"));
        assert!(text.contains("accuracy"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
    }
}
