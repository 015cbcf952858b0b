//! Training module
//!
//! - `epoch`: one training or evaluation pass over a partition
//! - `fold`: per-fold controller with early stopping and best-state restore
//! - `cross_validation`: dataset preparation and the sequential fold loop
//! - `aggregate`: cross-fold averages and the saved artifact
//! - `scheduler`: step-based learning rate schedules
//! - `sink`: scalar metric reporting

pub mod aggregate;
pub mod cross_validation;
pub mod early_stopping;
pub mod epoch;
pub mod fold;
pub mod scheduler;
pub mod sink;

pub use aggregate::{persist_outputs, ClassAverage, CrossValidationReport};
pub use cross_validation::{
    prepare_folds, run_cross_validation, CrossValidationOutcome, PreparedFolds,
};
pub use early_stopping::{BestState, EarlyStopping};
pub use epoch::{evaluate, train_epoch, EpochOutcome, PassContext, PassMode};
pub use fold::{FoldController, FoldHistory, FoldOutcome, FoldResult};
pub use scheduler::{LrSchedule, StepScheduler};
pub use sink::{emit, FanoutSink, JsonlMetricSink, MetricSink, RecordingSink, TracingSink};
