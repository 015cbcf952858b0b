//! Run configuration
//!
//! Every field has a default reproducing the reference training run, so an
//! empty TOML file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::ClassifierConfig;
use crate::utils::error::{CrossValError, Result};

/// One class, its folder prefix in the blob store, and its label (position in the list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFolder {
    pub name: String,
    pub prefix: String,
}

impl ClassFolder {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }
}

/// What to do when a sample cannot be read or decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Abort the run on the first failure
    #[default]
    Strict,
    /// Retry up to `attempts` times in total, then abort
    Retry { attempts: usize },
    /// Log a warning and drop the sample from its batch
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the local blob store
    pub root: PathBuf,

    /// Class folders in label order
    pub class_folders: Vec<ClassFolder>,

    /// Square input resolution
    pub image_size: usize,

    pub load_policy: LoadPolicy,

    /// Threads used to fetch and decode a batch
    pub num_workers: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            class_folders: vec![
                ClassFolder::new("NON-MS", "MS_MRI_2CLASS/2C/NON-MS"),
                ClassFolder::new("MS", "MS_MRI_2CLASS/2C/MS"),
            ],
            image_size: 384,
            load_policy: LoadPolicy::Strict,
            num_workers: 4,
        }
    }
}

impl DataConfig {
    pub fn class_names(&self) -> Vec<String> {
        self.class_folders.iter().map(|c| c.name.clone()).collect()
    }
}

/// Optimization and early-stopping parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub n_folds: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Consecutive non-improving epochs before a fold stops
    pub patience: usize,
    /// Maximum epochs per fold
    pub epochs: usize,
    /// Linear warmup length in optimizer steps
    pub warmup_steps: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_folds: 6,
            batch_size: 8,
            learning_rate: 1e-5,
            weight_decay: 0.01,
            patience: 1,
            epochs: 10,
            warmup_steps: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Artifact name before the `_YYYYMMDD_HHMMSS` suffix
    pub artifact_prefix: String,
    /// Optional JSON-lines file receiving every logged scalar
    pub metrics_file: Option<PathBuf>,
    /// Write the aggregated report next to the artifact
    pub report_file: bool,
    /// Show progress bars during passes
    pub progress: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            artifact_prefix: "final_ms_model_2classes_vit_base_384_bce".to_string(),
            metrics_file: None,
            report_file: true,
            progress: true,
        }
    }
}

/// Complete configuration of a cross-validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossValidationConfig {
    /// Seed for fold partitioning, epoch shuffling and parameter initialization
    pub seed: u64,
    pub data: DataConfig,
    pub model: ClassifierConfig,
    pub training: TrainingParams,
    pub output: OutputConfig,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            data: DataConfig::default(),
            model: ClassifierConfig::default(),
            training: TrainingParams::default(),
            output: OutputConfig::default(),
        }
    }
}

impl CrossValidationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        if training.n_folds < 2 {
            return Err(CrossValError::Config(format!(
                "n_folds must be at least 2, got {}",
                training.n_folds
            )));
        }
        if training.batch_size == 0 {
            return Err(CrossValError::Config("batch_size must be positive".into()));
        }
        if training.epochs == 0 {
            return Err(CrossValError::Config("epochs must be positive".into()));
        }
        if !(training.learning_rate > 0.0 && training.learning_rate.is_finite()) {
            return Err(CrossValError::Config(format!(
                "learning_rate must be a positive number, got {}",
                training.learning_rate
            )));
        }
        if self.data.class_folders.len() != 2 {
            return Err(CrossValError::Config(format!(
                "binary classification needs exactly 2 class folders, got {}",
                self.data.class_folders.len()
            )));
        }
        if self.data.image_size == 0 {
            return Err(CrossValError::Config("image_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(CrossValError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.model.dropout
            )));
        }
        if let Some(expected) = self.model.backbone.expected_image_size() {
            if expected != self.data.image_size {
                return Err(CrossValError::Config(format!(
                    "backbone expects {}x{} input but data.image_size is {}",
                    expected, expected, self.data.image_size
                )));
            }
        }
        if let LoadPolicy::Retry { attempts } = self.data.load_policy {
            if attempts == 0 {
                return Err(CrossValError::Config(
                    "retry policy needs at least one attempt".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_toml_config(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Read and deserialize a TOML file
pub fn load_toml_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        CrossValError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackboneConfig;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = CrossValidationConfig::default();
        assert_eq!(config.seed, 1);
        assert_eq!(config.training.n_folds, 6);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.training.learning_rate, 1e-5);
        assert_eq!(config.training.weight_decay, 0.01);
        assert_eq!(config.training.patience, 1);
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.data.image_size, 384);
        assert_eq!(config.data.class_names(), vec!["NON-MS", "MS"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() -> Result<()> {
        let config: CrossValidationConfig = toml::from_str("")?;
        assert_eq!(config.training.n_folds, 6);
        assert_eq!(config.data.load_policy, LoadPolicy::Strict);
        Ok(())
    }

    #[test]
    fn test_partial_toml_overrides() -> Result<()> {
        let config: CrossValidationConfig = toml::from_str(
            r#"
            seed = 7

            [training]
            n_folds = 3
            epochs = 2

            [data.load_policy]
            mode = "retry"
            attempts = 3

            [model]
            hidden_units = 16

            [model.backbone]
            kind = "mean_pool"
            "#,
        )?;
        assert_eq!(config.seed, 7);
        assert_eq!(config.training.n_folds, 3);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.data.load_policy, LoadPolicy::Retry { attempts: 3 });
        assert!(matches!(config.model.backbone, BackboneConfig::MeanPool));
        Ok(())
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.toml");
        let mut config = CrossValidationConfig::default();
        config.training.n_folds = 4;
        config.save(&path)?;

        let loaded = CrossValidationConfig::load(&path)?;
        assert_eq!(loaded.training.n_folds, 4);
        assert_eq!(loaded.output.artifact_prefix, config.output.artifact_prefix);
        Ok(())
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CrossValidationConfig::default();
        config.training.n_folds = 1;
        assert!(config.validate().is_err());

        let mut config = CrossValidationConfig::default();
        config.model.dropout = 1.0;
        assert!(config.validate().is_err());

        let mut config = CrossValidationConfig::default();
        config.data.image_size = 224;
        assert!(config.validate().is_err());

        let mut config = CrossValidationConfig::default();
        config.data.class_folders.pop();
        assert!(config.validate().unwrap_err().is_fatal_config());
    }
}
