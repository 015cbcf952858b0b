//! Per-fold training
//!
//! A fold goes through: fresh model, optimizer and scheduler; up to
//! `epochs` train + validate rounds with early stopping on validation loss;
//! restoration of the best epoch's parameters; and a final evaluation of the
//! restored model that produces the [`FoldResult`].

use burn::module::{AutodiffModule, Module};
use burn::optim::AdamWConfig;
use burn::tensor::backend::AutodiffBackend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CrossValidationConfig;
use crate::dataset::{ClassDataset, ClassifierBatcher, Fold, SampleLoader};
use crate::model::BinaryClassifier;
use crate::training::early_stopping::{BestState, EarlyStopping};
use crate::training::epoch::{evaluate, train_epoch, EpochOutcome, PassContext};
use crate::training::scheduler::{LrSchedule, StepScheduler};
use crate::training::sink::{emit, MetricSink};
use crate::utils::error::Result;
use crate::utils::logging::{EpochLogger, EpochSummary};
use crate::utils::metrics::ClassMetrics;

/// Validation metrics of one fold after best-state restoration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult {
    /// One-based fold number
    pub fold: usize,
    pub accuracy: f64,
    pub weighted_f1: f64,
    pub per_class: Vec<ClassMetrics>,
    pub validation_size: usize,
    /// Validation loss of the restored model
    pub val_loss: f64,
}

/// What happened during a fold's epoch loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoldHistory {
    pub fold: usize,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub epochs_run: usize,
    pub stopped_early: bool,
    /// One-based epoch whose parameters were restored
    pub best_epoch: usize,
}

pub struct FoldOutcome<B: AutodiffBackend> {
    pub result: FoldResult,
    pub history: FoldHistory,
    pub model: BinaryClassifier<B>,
}

pub type ClassifierRecord<B> = <BinaryClassifier<B> as Module<B>>::Record;

/// Owned copy of the model's parameters at `epoch`
pub fn snapshot<B: AutodiffBackend>(
    model: &BinaryClassifier<B>,
    epoch: usize,
    val_loss: f64,
) -> BestState<ClassifierRecord<B>> {
    BestState::new(epoch, val_loss, model.clone().into_record())
}

/// Load the snapshot back into `model`
pub fn restore_best<B: AutodiffBackend>(
    model: BinaryClassifier<B>,
    best: BestState<ClassifierRecord<B>>,
) -> BinaryClassifier<B> {
    model.load_record(best.record)
}

pub struct FoldController<'a> {
    config: &'a CrossValidationConfig,
    dataset: &'a ClassDataset,
    loader: &'a SampleLoader,
    sink: &'a dyn MetricSink,
    total_folds: usize,
}

impl<'a> FoldController<'a> {
    pub fn new(
        config: &'a CrossValidationConfig,
        dataset: &'a ClassDataset,
        loader: &'a SampleLoader,
        sink: &'a dyn MetricSink,
    ) -> Self {
        Self {
            config,
            dataset,
            loader,
            sink,
            total_folds: config.training.n_folds,
        }
    }

    fn context(&self, epoch: usize) -> PassContext<'_> {
        PassContext {
            loader: self.loader,
            batcher: ClassifierBatcher::new(self.loader.image_size()),
            batch_size: self.config.training.batch_size,
            class_names: self.dataset.class_names(),
            epoch,
            progress: self.config.output.progress,
        }
    }

    pub fn run<B: AutodiffBackend>(&self, fold: &Fold, device: &B::Device) -> Result<FoldOutcome<B>> {
        let params = &self.config.training;
        let fold_seed = self.config.seed.wrapping_add(fold.index as u64);
        let mut logger = EpochLogger::new(fold.number(), self.total_folds, params.epochs);
        logger.start_fold(fold.train.len(), fold.validation.len());

        // INIT
        B::seed(fold_seed);
        let mut model: BinaryClassifier<B> = self.config.model.init(device)?;
        let mut optimizer = AdamWConfig::new()
            .with_weight_decay(params.weight_decay as f32)
            .with_epsilon(1e-8)
            .init();
        let steps_per_epoch = self.context(0).num_batches(fold.train.len());
        let mut scheduler = StepScheduler::new(LrSchedule::linear_warmup_decay(
            params.learning_rate,
            params.warmup_steps,
            params.epochs * steps_per_epoch,
        ));
        let mut stopping = EarlyStopping::new(params.patience);
        let mut best: Option<BestState<ClassifierRecord<B>>> = None;
        let mut history = FoldHistory {
            fold: fold.number(),
            ..FoldHistory::default()
        };

        let mut order = fold.train.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(fold_seed);
        let validation = self.dataset.select(&fold.validation);

        // EPOCH_LOOP
        for epoch in 1..=params.epochs {
            logger.start_epoch(epoch);
            let ctx = self.context(epoch);
            let learning_rate = scheduler.current_lr();

            order.shuffle(&mut rng);
            let train_samples = self.dataset.select(&order);
            let (trained, train_outcome) =
                train_epoch(model, &mut optimizer, &mut scheduler, &train_samples, &ctx, device)?;
            model = trained;

            let val_outcome = evaluate(&model.valid(), &validation, &ctx, device)?;
            self.report_epoch(&logger, epoch, learning_rate, &train_outcome, &val_outcome);

            history.train_losses.push(train_outcome.mean_loss);
            history.val_losses.push(val_outcome.mean_loss);
            history.epochs_run = epoch;

            if stopping.observe(epoch, val_outcome.mean_loss) {
                logger.log_new_best(epoch, val_outcome.mean_loss);
                best = Some(snapshot(&model, epoch, val_outcome.mean_loss));
            }

            if stopping.should_stop() {
                logger.log_early_stop(epoch, params.patience);
                history.stopped_early = true;
                break;
            }
        }

        // RESTORE_BEST
        if let Some(best) = best {
            info!(
                "Fold {}: restoring epoch {} (val loss {:.4})",
                fold.number(),
                best.epoch,
                best.val_loss
            );
            history.best_epoch = best.epoch;
            model = restore_best(model, best);
        }

        // FINAL_EVAL
        let result = self.final_evaluation(&model, fold, history.epochs_run, device)?;
        logger.end_fold(result.accuracy, result.weighted_f1);

        Ok(FoldOutcome {
            result,
            history,
            model,
        })
    }

    /// Evaluate the restored model on the fold's validation split once more
    /// and publish the fold-level metrics.
    pub fn final_evaluation<B: AutodiffBackend>(
        &self,
        model: &BinaryClassifier<B>,
        fold: &Fold,
        epoch: usize,
        device: &B::Device,
    ) -> Result<FoldResult> {
        let validation = self.dataset.select(&fold.validation);
        let outcome = evaluate(&model.valid(), &validation, &self.context(epoch), device)?;

        info!(
            "Fold {} classification report:\n{}",
            fold.number(),
            outcome.metrics.classification_report()
        );

        let result = FoldResult {
            fold: fold.number(),
            accuracy: outcome.accuracy(),
            weighted_f1: outcome.weighted_f1(),
            per_class: outcome.metrics.per_class.clone(),
            validation_size: outcome.labels.len(),
            val_loss: outcome.mean_loss,
        };

        emit(
            self.sink,
            &format!("fold_{}_accuracy", result.fold),
            result.accuracy,
        );
        emit(
            self.sink,
            &format!("fold_{}_f1_score", result.fold),
            result.weighted_f1,
        );

        Ok(result)
    }

    fn report_epoch(
        &self,
        logger: &EpochLogger,
        epoch: usize,
        learning_rate: f64,
        train: &EpochOutcome,
        val: &EpochOutcome,
    ) {
        let summary = EpochSummary {
            epoch,
            train_loss: train.mean_loss,
            val_loss: val.mean_loss,
            precision: val.metrics.weighted_precision,
            recall: val.metrics.weighted_recall,
            f1: val.metrics.weighted_f1,
            learning_rate,
        };
        logger.end_epoch(&summary);

        emit(self.sink, "train_loss", summary.train_loss);
        emit(self.sink, "val_loss", summary.val_loss);
        emit(self.sink, "precision", summary.precision);
        emit(self.sink, "recall", summary.recall);
        emit(self.sink, "f1_score", summary.f1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackboneConfig, ClassifierConfig};
    use burn::backend::Autodiff;
    use burn::nn::loss::BinaryCrossEntropyLossConfig;
    use burn::optim::{GradientsParams, Optimizer};
    use burn::tensor::{Int, Tensor, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn bits(model: &BinaryClassifier<TestBackend>, images: &Tensor<TestBackend, 4>) -> Vec<u32> {
        model
            .forward(images.clone())
            .into_data()
            .iter::<f32>()
            .map(f32::to_bits)
            .collect()
    }

    #[test]
    fn test_restore_returns_snapshot_parameters_exactly() {
        let device = Default::default();
        let config = ClassifierConfig {
            backbone: BackboneConfig::MeanPool,
            hidden_units: 8,
            dropout: 0.0,
            ..ClassifierConfig::default()
        };
        let mut model = config.build::<TestBackend>(&device);

        let values: Vec<f32> = (0..4 * 3 * 4 * 4).map(|i| (i % 7) as f32 / 7.0 - 0.5).collect();
        let images =
            Tensor::<TestBackend, 4>::from_floats(TensorData::new(values, [4, 3, 4, 4]), &device);
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![1i64, 0, 1, 0], [4]), &device);

        let best = snapshot(&model, 1, 0.5);
        let expected = bits(&model, &images);

        let loss_fn = BinaryCrossEntropyLossConfig::new().with_logits(true).init(&device);
        let mut optimizer = AdamWConfig::new().init::<TestBackend, BinaryClassifier<TestBackend>>();
        for _ in 0..3 {
            let loss = loss_fn.forward(model.forward(images.clone()), targets.clone());
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(0.1, model, grads);
        }
        assert_ne!(bits(&model, &images), expected);

        let restored = restore_best(model, best);
        assert_eq!(bits(&restored, &images), expected);
    }
}
