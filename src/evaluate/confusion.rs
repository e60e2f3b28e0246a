use std::fmt;

use serde::{Deserialize, Serialize};

/// Counts of (true class, predicted class) pairs.
///
/// Rows are true classes, columns are predicted classes, so row sums are
/// class supports and the diagonal holds correct predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        ConfusionMatrix { n_classes, counts: vec![vec![0; n_classes]; n_classes] }
    }

    /// # Panics
    /// Panics if the slices differ in length or hold a label `>= n_classes`.
    pub fn from_predictions(predictions: &[usize], truths: &[usize], n_classes: usize) -> Self {
        assert_eq!(predictions.len(), truths.len(), "predictions and truths must have equal length");
        let mut matrix = ConfusionMatrix::new(n_classes);
        for (&p, &t) in predictions.iter().zip(truths) {
            matrix.record(t, p);
        }
        matrix
    }

    pub fn record(&mut self, truth: usize, predicted: usize) {
        self.counts[truth][predicted] += 1;
    }

    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth][predicted]
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    /// Number of recorded predictions.
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.n_classes).map(|c| self.counts[c][c]).sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.counts[class][class]
    }

    /// Predicted as `class` but belonging elsewhere (column sum minus diagonal).
    pub fn false_positives(&self, class: usize) -> usize {
        (0..self.n_classes).filter(|&r| r != class).map(|r| self.counts[r][class]).sum()
    }

    /// Belonging to `class` but predicted elsewhere (row sum minus diagonal).
    pub fn false_negatives(&self, class: usize) -> usize {
        (0..self.n_classes).filter(|&c| c != class).map(|c| self.counts[class][c]).sum()
    }

    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }
}

/// Plain-text grid: predicted-class indices across, true-class indices down.
impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widest = self.max_count().max(self.n_classes.saturating_sub(1));
        let width = widest.to_string().len() + 2;
        write!(f, "{:>4}", "")?;
        for c in 0..self.n_classes {
            write!(f, "{:>width$}", c, width = width)?;
        }
        writeln!(f)?;
        for (r, row) in self.counts.iter().enumerate() {
            write!(f, "{:>4}", r)?;
            for count in row {
                write!(f, "{:>width$}", count, width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
