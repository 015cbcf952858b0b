//! Metrics Module for Model Evaluation
//!
//! Classification metrics computed from hard predictions:
//! - Accuracy
//! - Per-class precision, recall, F1-score and support
//! - Support-weighted and macro averages
//! - Confusion matrix and a plain-text classification report

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Metrics for one set of predictions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Support-weighted precision
    pub weighted_precision: f64,

    /// Support-weighted recall
    pub weighted_recall: f64,

    /// Support-weighted F1-score
    pub weighted_f1: f64,

    /// Unweighted mean of per-class F1
    pub macro_f1: f64,

    /// Per-class metrics, indexed by label
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Compute metrics from predicted and true labels.
    ///
    /// Labels must be in `0..class_names.len()`. A class with no predicted
    /// samples gets precision 0, and a class with no true samples gets
    /// recall 0 and contributes nothing to the weighted averages.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        class_names: &[String],
    ) -> Self {
        debug_assert_eq!(predictions.len(), ground_truth.len());

        let num_classes = class_names.len();
        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let total_samples = predictions.len().min(ground_truth.len());
        let correct_predictions = confusion_matrix.trace();
        let accuracy = if total_samples > 0 {
            correct_predictions as f64 / total_samples as f64
        } else {
            0.0
        };

        let per_class: Vec<ClassMetrics> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| ClassMetrics::from_confusion_matrix(&confusion_matrix, idx, name))
            .collect();

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted = |value: fn(&ClassMetrics) -> f64| {
            if total_support == 0 {
                0.0
            } else {
                per_class
                    .iter()
                    .map(|m| value(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            }
        };

        let weighted_precision = weighted(|m| m.precision);
        let weighted_recall = weighted(|m| m.recall);
        let weighted_f1 = weighted(|m| m.f1);

        let macro_f1 = if num_classes > 0 {
            per_class.iter().map(|m| m.f1).sum::<f64>() / num_classes as f64
        } else {
            0.0
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            weighted_precision,
            weighted_recall,
            weighted_f1,
            macro_f1,
            per_class,
            confusion_matrix,
        }
    }

    /// Plain-text report with one row per class plus accuracy and averages
    pub fn classification_report(&self) -> String {
        let width = self
            .per_class
            .iter()
            .map(|m| m.class_name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );
        for m in &self.per_class {
            let _ = writeln!(
                out,
                "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                m.class_name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                width = width
            );
        }
        let _ = writeln!(
            out,
            "{:>width$} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            width = width
        );
        let _ = writeln!(
            out,
            "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
            "weighted avg",
            self.weighted_precision,
            self.weighted_recall,
            self.weighted_f1,
            self.total_samples,
            width = width
        );
        out
    }
}

/// Metrics for a single class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_name: String,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of true samples of this class
    pub support: usize,
}

impl ClassMetrics {
    fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize, class_name: &str) -> Self {
        let tp = cm.get(class_idx, class_idx);
        let fp = cm.column_sum(class_idx) - tp;
        let fn_ = cm.row_sum(class_idx) - tp;

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_name: class_name.to_string(),
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Confusion matrix, rows are true labels and columns are predictions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    pub matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from label slices; out-of-range labels are ignored
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut matrix = vec![vec![0usize; num_classes]; num_classes];
        for (&pred, &truth) in predictions.iter().zip(ground_truth) {
            if pred < num_classes && truth < num_classes {
                matrix[truth][pred] += 1;
            }
        }
        Self {
            num_classes,
            matrix,
        }
    }

    pub fn get(&self, truth: usize, pred: usize) -> usize {
        self.matrix[truth][pred]
    }

    pub fn row_sum(&self, truth: usize) -> usize {
        self.matrix[truth].iter().sum()
    }

    pub fn column_sum(&self, pred: usize) -> usize {
        self.matrix.iter().map(|row| row[pred]).sum()
    }

    pub fn trace(&self) -> usize {
        (0..self.num_classes).map(|i| self.matrix[i][i]).sum()
    }
}
