//! Cross-fold aggregation and artifact persistence
//!
//! Fold metrics are averaged without weighting by validation size. The final
//! artifact holds the parameters of the last fold's restored model.

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{save_model, BinaryClassifier};
use crate::training::fold::FoldResult;
use crate::utils::error::{CrossValError, Result};
use crate::utils::metrics::ClassMetrics;

/// Mean per-class metrics across folds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassAverage {
    pub class_name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldResult>,
    pub mean_accuracy: f64,
    pub mean_f1: f64,
    pub per_class: Vec<ClassAverage>,
}

impl CrossValidationReport {
    pub fn from_folds(folds: Vec<FoldResult>) -> Result<Self> {
        if folds.is_empty() {
            return Err(CrossValError::EmptyFolds);
        }
        let n = folds.len() as f64;

        let mean_accuracy = folds.iter().map(|f| f.accuracy).sum::<f64>() / n;
        let mean_f1 = folds.iter().map(|f| f.weighted_f1).sum::<f64>() / n;

        let num_classes = folds[0].per_class.len();
        if folds.iter().any(|f| f.per_class.len() != num_classes) {
            return Err(CrossValError::Model(
                "fold reports disagree on the number of classes".into(),
            ));
        }

        let per_class = (0..num_classes)
            .map(|class| {
                let mean = |value: fn(&ClassMetrics) -> f64| {
                    folds.iter().map(|f| value(&f.per_class[class])).sum::<f64>() / n
                };
                ClassAverage {
                    class_name: folds[0].per_class[class].class_name.clone(),
                    precision: mean(|m| m.precision),
                    recall: mean(|m| m.recall),
                    f1: mean(|m| m.f1),
                }
            })
            .collect();

        Ok(Self {
            folds,
            mean_accuracy,
            mean_f1,
            per_class,
        })
    }

    /// Log the averages the same way they are printed by the CLI
    pub fn log(&self) {
        info!(
            "Average accuracy over {} folds: {:.4}",
            self.folds.len(),
            self.mean_accuracy
        );
        info!("Average F1 score: {:.4}", self.mean_f1);
        for class in &self.per_class {
            info!(
                "Class {}: precision {:.4} | recall {:.4} | f1-score {:.4}",
                class.class_name, class.precision, class.recall, class.f1
            );
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// `{prefix}_{YYYYMMDD_HHMMSS}`
pub fn artifact_stem(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}_{}", prefix, at.format("%Y%m%d_%H%M%S"))
}

/// Write the final model into `dir` under a timestamped name; returns the file path
pub fn save_final_model<B: Backend>(
    model: &BinaryClassifier<B>,
    dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = save_model(model, &dir.join(format!("{}.bin", stem)))?;
    info!("Saved final model to {}", path.display());
    Ok(path)
}

/// `{stem}_report.json` next to the artifact
pub fn report_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}_report.json", stem))
}

/// Write the JSON report (if requested) and then the model artifact.
///
/// Nothing is left behind on failure: a report is only followed by the
/// artifact, and a failed artifact write removes the report again.
pub fn persist_outputs<B: Backend>(
    report: &CrossValidationReport,
    model: &BinaryClassifier<B>,
    dir: &Path,
    stem: &str,
    write_report: bool,
) -> Result<(PathBuf, Option<PathBuf>)> {
    fs::create_dir_all(dir)?;

    let written_report = if write_report {
        let path = report_path(dir, stem);
        report.save_json(&path)?;
        Some(path)
    } else {
        None
    };

    match save_final_model(model, dir, stem) {
        Ok(artifact) => Ok((artifact, written_report)),
        Err(err) => {
            if let Some(path) = &written_report {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
            Err(err)
        }
    }
}
