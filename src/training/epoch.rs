//! One pass over a data partition
//!
//! `train_epoch` runs forward, BCE-with-logits loss, backward, an AdamW step
//! and one scheduler step per batch. `evaluate` runs forward and loss only,
//! on a model without autodiff. Both threshold logits at 0 (probability 0.5)
//! and return the mean batch loss with every label and prediction seen.

use burn::data::dataloader::batcher::Batcher;
use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::dataset::{ClassifierBatch, ClassifierBatcher, ClassifierItem, Sample, SampleLoader};
use crate::model::BinaryClassifier;
use crate::training::scheduler::StepScheduler;
use crate::utils::error::{CrossValError, Result};
use crate::utils::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    Training,
    Evaluation,
}

impl PassMode {
    fn label(self) -> &'static str {
        match self {
            PassMode::Training => "train",
            PassMode::Evaluation => "eval",
        }
    }
}

/// Result of one pass
#[derive(Debug, Clone)]
pub struct EpochOutcome {
    pub mode: PassMode,
    /// Mean of per-batch losses
    pub mean_loss: f64,
    pub labels: Vec<usize>,
    pub predictions: Vec<usize>,
    pub metrics: Metrics,
    pub batches: usize,
}

impl EpochOutcome {
    pub fn weighted_f1(&self) -> f64 {
        self.metrics.weighted_f1
    }

    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }
}

/// Everything a pass needs besides the model
pub struct PassContext<'a> {
    pub loader: &'a SampleLoader,
    pub batcher: ClassifierBatcher,
    pub batch_size: usize,
    pub class_names: &'a [String],
    /// 1-based epoch, used in diagnostics
    pub epoch: usize,
    pub progress: bool,
}

impl PassContext<'_> {
    pub fn num_batches(&self, samples: usize) -> usize {
        samples.div_ceil(self.batch_size.max(1))
    }

    fn progress_bar(&self, mode: PassMode, batches: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(batches as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix:>12} [{bar:30.cyan/blue}] {pos}/{len} batches {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(format!("epoch {} {}", self.epoch, mode.label()));
        bar
    }

    fn load<B: Backend>(
        &self,
        chunk: &[Sample],
        device: &B::Device,
    ) -> Result<Option<ClassifierBatch<B>>> {
        let items = self.loader.load_batch(chunk)?;
        if items.is_empty() {
            warn!("Epoch {}: every sample in a batch was skipped", self.epoch);
            return Ok(None);
        }
        let batch = Batcher::<B, ClassifierItem, ClassifierBatch<B>>::batch(
            &self.batcher,
            items,
            device,
        );
        Ok(Some(batch))
    }
}

struct PassAccumulator {
    mode: PassMode,
    loss_sum: f64,
    batches: usize,
    labels: Vec<usize>,
    predictions: Vec<usize>,
}

impl PassAccumulator {
    fn new(mode: PassMode, capacity: usize) -> Self {
        Self {
            mode,
            loss_sum: 0.0,
            batches: 0,
            labels: Vec::with_capacity(capacity),
            predictions: Vec::with_capacity(capacity),
        }
    }

    fn check_loss(&self, epoch: usize, loss: f64) -> Result<()> {
        if loss.is_finite() {
            Ok(())
        } else {
            Err(CrossValError::NonFiniteLoss {
                epoch,
                batch: self.batches,
                value: loss,
            })
        }
    }

    fn record<B: Backend>(&mut self, loss: f64, logits: Tensor<B, 1>, labels: Vec<usize>) {
        self.loss_sum += loss;
        self.batches += 1;
        self.predictions.extend(
            logits
                .into_data()
                .iter::<f32>()
                .map(|logit| usize::from(logit > 0.0)),
        );
        self.labels.extend(labels);
    }

    fn finish(self, ctx: &PassContext) -> Result<EpochOutcome> {
        if self.batches == 0 {
            return Err(CrossValError::Config(format!(
                "epoch {} {} pass had no loadable batches",
                ctx.epoch,
                self.mode.label()
            )));
        }
        let metrics = Metrics::from_predictions(&self.predictions, &self.labels, ctx.class_names);
        Ok(EpochOutcome {
            mode: self.mode,
            mean_loss: self.loss_sum / self.batches as f64,
            labels: self.labels,
            predictions: self.predictions,
            metrics,
            batches: self.batches,
        })
    }
}

/// Train for one pass over `samples` in the given order
pub fn train_epoch<B, O>(
    mut model: BinaryClassifier<B>,
    optimizer: &mut O,
    scheduler: &mut StepScheduler,
    samples: &[Sample],
    ctx: &PassContext,
    device: &B::Device,
) -> Result<(BinaryClassifier<B>, EpochOutcome)>
where
    B: AutodiffBackend,
    O: Optimizer<BinaryClassifier<B>, B>,
{
    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(device);
    let mut acc = PassAccumulator::new(PassMode::Training, samples.len());
    let progress = ctx.progress_bar(PassMode::Training, ctx.num_batches(samples.len()));

    for chunk in samples.chunks(ctx.batch_size.max(1)) {
        progress.inc(1);
        let Some(batch) = ctx.load::<B>(chunk, device)? else {
            continue;
        };

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets);
        let loss_value: f64 = loss.clone().into_scalar().elem();
        acc.check_loss(ctx.epoch, loss_value)?;

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(scheduler.current_lr(), model, grads);
        scheduler.step();

        progress.set_message(format!("loss {:.4}", loss_value));
        acc.record(loss_value, logits, batch.labels);
    }
    progress.finish_and_clear();

    let outcome = acc.finish(ctx)?;
    Ok((model, outcome))
}

/// Forward-only pass; call with `model.valid()` so dropout is off and no graph is built
pub fn evaluate<B: Backend>(
    model: &BinaryClassifier<B>,
    samples: &[Sample],
    ctx: &PassContext,
    device: &B::Device,
) -> Result<EpochOutcome> {
    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(device);
    let mut acc = PassAccumulator::new(PassMode::Evaluation, samples.len());
    let progress = ctx.progress_bar(PassMode::Evaluation, ctx.num_batches(samples.len()));

    for chunk in samples.chunks(ctx.batch_size.max(1)) {
        progress.inc(1);
        let Some(batch) = ctx.load::<B>(chunk, device)? else {
            continue;
        };

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets);
        let loss_value: f64 = loss.into_scalar().elem();
        acc.check_loss(ctx.epoch, loss_value)?;

        acc.record(loss_value, logits, batch.labels);
    }
    progress.finish_and_clear();

    acc.finish(ctx)
}
