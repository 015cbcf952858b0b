//! # MRI Cross-Validation
//!
//! Cross-validated training of a binary MRI classifier (MS vs. NON-MS) with the
//! Burn framework: a Vision Transformer backbone with a small trainable head,
//! stratified k-fold partitioning, AdamW with linear learning-rate decay,
//! early stopping on validation loss and cross-fold metric aggregation.
//!
//! ## Modules
//!
//! - `storage`: blob store abstraction (local directory, in-memory)
//! - `dataset`: dataset assembly, preprocessing, loading, batching, fold splits
//! - `model`: ViT backbone and binary classifier
//! - `training`: epoch loop, fold controller, aggregation, metric sinks
//! - `utils`: logging, metrics and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mri_crossval::{CrossValidationConfig, LocalBlobStore, VitImageProcessor};
//! use mri_crossval::training::{run_cross_validation, TracingSink};
//!
//! let config = CrossValidationConfig::default();
//! let store = Arc::new(LocalBlobStore::new(&config.data.root));
//! let processor = Arc::new(VitImageProcessor::new(config.data.image_size));
//! let outcome = run_cross_validation::<TrainingBackend>(&config, store, processor, &TracingSink, &device)?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod storage;
pub mod training;
pub mod utils;

pub use config::{ClassFolder, CrossValidationConfig, LoadPolicy};
pub use dataset::{
    ClassDataset, DatasetBuilder, Sample, SampleLoader, StratifiedKFold, VitImageProcessor,
};
pub use model::{BinaryClassifier, ClassifierConfig};
pub use storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use training::{CrossValidationReport, FoldResult};
pub use utils::error::{CrossValError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
