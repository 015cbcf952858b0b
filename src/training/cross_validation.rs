//! Full cross-validation run
//!
//! Folds run one after another on a single device. Any fold error aborts the
//! run before the artifact is written.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use tracing::info;

use crate::config::CrossValidationConfig;
use crate::dataset::{
    ClassDataset, DatasetBuilder, Fold, ImagePreprocessor, SampleLoader, StratifiedKFold,
};
use crate::model::BinaryClassifier;
use crate::storage::BlobStore;
use crate::training::aggregate::{artifact_stem, persist_outputs, CrossValidationReport};
use crate::training::fold::{FoldController, FoldHistory};
use crate::training::sink::MetricSink;
use crate::utils::error::{CrossValError, Result};
use crate::utils::format_duration;

pub struct CrossValidationOutcome<B: AutodiffBackend> {
    pub report: CrossValidationReport,
    pub histories: Vec<FoldHistory>,
    /// Saved parameters of the last fold's model
    pub artifact: PathBuf,
    pub report_path: Option<PathBuf>,
    pub final_model: BinaryClassifier<B>,
}

/// Balanced dataset and its folds, checked against the configuration
pub struct PreparedFolds {
    pub dataset: ClassDataset,
    pub folds: Vec<Fold>,
}

/// Validate the configuration, build the dataset and partition it.
///
/// Everything that can be rejected as a configuration error fails here,
/// before any model is built.
pub fn prepare_folds(
    config: &CrossValidationConfig,
    store: Arc<dyn BlobStore>,
) -> Result<PreparedFolds> {
    config.validate()?;

    let dataset = DatasetBuilder::new(store).build(&config.data.class_folders)?;
    let folds = StratifiedKFold::new(config.training.n_folds)
        .with_seed(config.seed)
        .split(&dataset.labels(), dataset.class_names())?;

    for fold in &folds {
        info!(
            "Fold {}: {} train / {} validation",
            fold.number(),
            fold.train.len(),
            fold.validation.len()
        );
    }

    Ok(PreparedFolds { dataset, folds })
}

pub fn run_cross_validation<B: AutodiffBackend>(
    config: &CrossValidationConfig,
    store: Arc<dyn BlobStore>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    sink: &dyn MetricSink,
    device: &B::Device,
) -> Result<CrossValidationOutcome<B>> {
    let started = Instant::now();
    if preprocessor.image_size() != config.data.image_size {
        return Err(CrossValError::Config(format!(
            "preprocessor produces {}px images but data.image_size is {}",
            preprocessor.image_size(),
            config.data.image_size
        )));
    }

    let PreparedFolds { dataset, folds } = prepare_folds(config, store.clone())?;
    let loader = SampleLoader::new(
        store,
        preprocessor,
        config.data.load_policy,
        config.data.num_workers,
    )?;
    let controller = FoldController::new(config, &dataset, &loader, sink);

    let mut results = Vec::with_capacity(folds.len());
    let mut histories = Vec::with_capacity(folds.len());
    let mut last_model = None;
    for fold in &folds {
        let outcome = controller.run::<B>(fold, device)?;
        results.push(outcome.result);
        histories.push(outcome.history);
        last_model = Some(outcome.model);
    }

    let report = CrossValidationReport::from_folds(results)?;
    report.log();

    let final_model = last_model.ok_or(CrossValError::EmptyFolds)?;
    let stem = artifact_stem(&config.output.artifact_prefix, Local::now());
    let (artifact, report_path) = persist_outputs(
        &report,
        &final_model,
        &config.output.dir,
        &stem,
        config.output.report_file,
    )?;

    info!(
        "Cross-validation finished in {}",
        format_duration(started.elapsed().as_secs_f64())
    );

    Ok(CrossValidationOutcome {
        report,
        histories,
        artifact,
        report_path,
        final_model,
    })
}
