//! Stratified k-fold partitioning
//!
//! Indices of each class are shuffled with a seeded ChaCha8 generator and
//! dealt round-robin over the folds, continuing the rotation from one class
//! to the next so fold sizes differ by at most one. Every index lands in
//! exactly one validation fold, and each fold's training set is the
//! complement of its validation set.
//!
//! The split is deterministic for a given seed and label order.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{CrossValError, Result};

/// One train/validation partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Zero-based fold index
    pub index: usize,
    /// Training indices, ascending
    pub train: Vec<usize>,
    /// Validation indices, ascending
    pub validation: Vec<usize>,
}

impl Fold {
    /// One-based fold number used in logs and metric names
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StratifiedKFold {
    n_splits: usize,
    seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits, seed: 1 }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Fail if the split is impossible: fewer than two folds, or a class
    /// smaller than the fold count (it could not appear in every validation set).
    pub fn check(&self, labels: &[usize], class_names: &[String]) -> Result<()> {
        if self.n_splits < 2 {
            return Err(CrossValError::Config(format!(
                "n_folds must be at least 2, got {}",
                self.n_splits
            )));
        }

        for (label, count) in class_counts(labels).into_iter().enumerate() {
            if count > 0 && count < self.n_splits {
                let class = class_names
                    .get(label)
                    .cloned()
                    .unwrap_or_else(|| format!("label {}", label));
                return Err(CrossValError::InsufficientSamples {
                    class,
                    count,
                    folds: self.n_splits,
                });
            }
        }
        Ok(())
    }

    pub fn split(&self, labels: &[usize], class_names: &[String]) -> Result<Vec<Fold>> {
        self.check(labels, class_names)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut assignment = vec![0usize; labels.len()];
        let mut next_fold = 0usize;

        for label in 0..class_counts(labels).len() {
            let mut members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == label)
                .map(|(i, _)| i)
                .collect();
            members.shuffle(&mut rng);

            for idx in members {
                assignment[idx] = next_fold;
                next_fold = (next_fold + 1) % self.n_splits;
            }
        }

        let folds = (0..self.n_splits)
            .map(|fold| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&i| assignment[i] == fold);
                Fold {
                    index: fold,
                    train,
                    validation,
                }
            })
            .collect();

        Ok(folds)
    }
}

fn class_counts(labels: &[usize]) -> Vec<usize> {
    let num_classes = labels.iter().max().map_or(0, |&m| m + 1);
    let mut counts = vec![0usize; num_classes];
    for &label in labels {
        counts[label] += 1;
    }
    counts
}
