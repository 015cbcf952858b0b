//! Dataset assembly from class folders
//!
//! Each declared folder is listed through the blob store and its objects get
//! the folder's position as label. Classes are then undersampled to the size
//! of the smallest class by keeping the first `min_count` paths of each class
//! in listing order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ClassFolder;
use crate::dataset::Sample;
use crate::storage::BlobStore;
use crate::utils::error::{CrossValError, Result};

/// Per-class counts before and after balancing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub class_names: Vec<String>,
    pub discovered: Vec<usize>,
    pub balanced: Vec<usize>,
}

impl DatasetSummary {
    pub fn total_discovered(&self) -> usize {
        self.discovered.iter().sum()
    }

    pub fn total_balanced(&self) -> usize {
        self.balanced.iter().sum()
    }

    pub fn print(&self) {
        println!("Dataset summary:");
        for (idx, name) in self.class_names.iter().enumerate() {
            println!(
                "  [{}] {:<16} {:>6} found -> {:>6} kept",
                idx, name, self.discovered[idx], self.balanced[idx]
            );
        }
        println!(
            "  Total: {} found -> {} kept",
            self.total_discovered(),
            self.total_balanced()
        );
    }
}

/// Balanced, labeled sample list
#[derive(Debug, Clone)]
pub struct ClassDataset {
    samples: Vec<Sample>,
    class_names: Vec<String>,
    summary: DatasetSummary,
}

impl ClassDataset {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn summary(&self) -> &DatasetSummary {
        &self.summary
    }

    /// Count of samples per label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.class_names.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Gather samples at the given dataset indices
    pub fn select(&self, indices: &[usize]) -> Vec<Sample> {
        indices.iter().map(|&i| self.samples[i].clone()).collect()
    }
}

pub struct DatasetBuilder {
    store: Arc<dyn BlobStore>,
}

impl DatasetBuilder {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// List every class folder, label by position, then balance to the minority class
    pub fn build(&self, folders: &[ClassFolder]) -> Result<ClassDataset> {
        if folders.is_empty() {
            return Err(CrossValError::Config("no class folders declared".into()));
        }

        let mut per_class: Vec<Vec<String>> = Vec::with_capacity(folders.len());
        for folder in folders {
            let paths = self.store.list(&folder.prefix)?;
            info!(
                "Class '{}': {} objects under {} ({})",
                folder.name,
                paths.len(),
                folder.prefix,
                self.store.describe()
            );
            if paths.is_empty() {
                return Err(CrossValError::EmptyClass {
                    class: folder.name.clone(),
                    prefix: folder.prefix.clone(),
                });
            }
            per_class.push(paths);
        }

        let discovered: Vec<usize> = per_class.iter().map(Vec::len).collect();
        let min_count = discovered.iter().copied().min().unwrap_or(0);
        info!(
            "Discovered {} samples; balancing every class to {}",
            discovered.iter().sum::<usize>(),
            min_count
        );

        let samples: Vec<Sample> = per_class
            .into_iter()
            .enumerate()
            .flat_map(|(label, paths)| {
                paths
                    .into_iter()
                    .take(min_count)
                    .map(move |path| Sample { path, label })
            })
            .collect();

        let summary = DatasetSummary {
            class_names: folders.iter().map(|f| f.name.clone()).collect(),
            discovered,
            balanced: vec![min_count; folders.len()],
        };
        info!(
            "Balanced dataset: {} samples ({} per class)",
            samples.len(),
            min_count
        );

        Ok(ClassDataset {
            samples,
            class_names: summary.class_names.clone(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn store_with(counts: &[(&str, usize)]) -> Arc<dyn BlobStore> {
        let store = MemoryBlobStore::new();
        for (prefix, count) in counts {
            for i in 0..*count {
                store.insert(format!("{}/img_{:03}.png", prefix, i), vec![0]);
            }
        }
        Arc::new(store)
    }

    fn folders() -> Vec<ClassFolder> {
        vec![
            ClassFolder::new("NON-MS", "2C/NON-MS"),
            ClassFolder::new("MS", "2C/MS"),
        ]
    }

    #[test]
    fn test_balances_to_minority_class() -> Result<()> {
        let store = store_with(&[("2C/NON-MS", 12), ("2C/MS", 5)]);
        let dataset = DatasetBuilder::new(store).build(&folders())?;

        assert_eq!(dataset.class_counts(), vec![5, 5]);
        assert_eq!(dataset.len(), 10);
        assert_eq!(dataset.summary().discovered, vec![12, 5]);
        assert_eq!(dataset.summary().total_balanced(), 10);
        Ok(())
    }

    #[test]
    fn test_keeps_first_paths_in_listing_order() -> Result<()> {
        let store = store_with(&[("2C/NON-MS", 4), ("2C/MS", 2)]);
        let dataset = DatasetBuilder::new(store).build(&folders())?;

        let paths: Vec<&str> = dataset.samples().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "2C/NON-MS/img_000.png",
                "2C/NON-MS/img_001.png",
                "2C/MS/img_000.png",
                "2C/MS/img_001.png",
            ]
        );
        assert_eq!(dataset.labels(), vec![0, 0, 1, 1]);
        Ok(())
    }

    #[test]
    fn test_labels_follow_declaration_order() -> Result<()> {
        let store = store_with(&[("2C/NON-MS", 3), ("2C/MS", 3)]);
        let reversed: Vec<ClassFolder> = folders().into_iter().rev().collect();
        let dataset = DatasetBuilder::new(store).build(&reversed)?;

        assert_eq!(dataset.class_names(), &["MS".to_string(), "NON-MS".to_string()]);
        assert!(dataset.samples()[0].path.starts_with("2C/MS/"));
        assert_eq!(dataset.samples()[0].label, 0);
        Ok(())
    }

    #[test]
    fn test_empty_class_is_a_config_error() {
        let store = store_with(&[("2C/NON-MS", 3)]);
        let err = DatasetBuilder::new(store).build(&folders()).unwrap_err();
        assert!(matches!(err, CrossValError::EmptyClass { ref class, .. } if class == "MS"));
        assert!(err.is_fatal_config());
    }
}
