//! Inverse-frequency ("balanced") class weights.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Per-class loss multipliers, indexed by class label.
///
/// Every entry is strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeightTable {
    weights: Vec<f64>,
}

impl ClassWeightTable {
    /// `w_c = n_total / (n_classes * n_c)`.
    ///
    /// `class_names` only labels the error; pass an empty slice when unknown.
    /// Fails with `EmptyClass` for the first class with zero samples.
    pub fn balanced(counts: &[usize], class_names: &[String]) -> Result<ClassWeightTable> {
        if counts.is_empty() {
            return Err(PipelineError::Config("cannot weight an empty class set".into()));
        }
        if let Some(class) = counts.iter().position(|&n| n == 0) {
            let name = class_names.get(class).cloned().unwrap_or_else(|| format!("class_{}", class));
            return Err(PipelineError::EmptyClass { class, name });
        }
        let n_total: usize = counts.iter().sum();
        let n_classes = counts.len() as f64;
        let weights = counts.iter()
            .map(|&n_c| n_total as f64 / (n_classes * n_c as f64))
            .collect();
        let table = ClassWeightTable { weights };
        info!(weights = ?table.weights, "computed balanced class weights");
        Ok(table)
    }

    /// Weight 1.0 for every class.
    pub fn uniform(n_classes: usize) -> ClassWeightTable {
        ClassWeightTable { weights: vec![1.0; n_classes] }
    }

    pub fn get(&self, class: usize) -> f64 {
        self.weights[class]
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    /// Σ_c (n_c / n_total) · w_c. Equals 1 for balanced weights no matter how
    /// the counts are scaled.
    pub fn frequency_weighted_sum(&self, counts: &[usize]) -> f64 {
        let n_total: usize = counts.iter().sum();
        counts.iter().zip(&self.weights)
            .map(|(&n, w)| n as f64 / n_total as f64 * w)
            .sum()
    }
}
