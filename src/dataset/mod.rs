//! Dataset handling for cross-validation
//!
//! This module provides:
//! - Dataset assembly from class folders with minority-class balancing
//! - Preprocessing of decoded images for the backbone
//! - Parallel sample loading under a configurable failure policy
//! - Burn batching
//! - Stratified k-fold partitioning

pub mod batcher;
pub mod builder;
pub mod loader;
pub mod preprocess;
pub mod split;

use serde::{Deserialize, Serialize};

pub use batcher::{ClassifierBatch, ClassifierBatcher, ClassifierItem};
pub use builder::{ClassDataset, DatasetBuilder, DatasetSummary};
pub use loader::SampleLoader;
pub use preprocess::{ImagePreprocessor, VitImageProcessor};
pub use split::{Fold, StratifiedKFold};

/// A blob path and its class label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub path: String,
    pub label: usize,
}
