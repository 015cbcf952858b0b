//! Logging Module
//!
//! Structured logging with `tracing`, plus a small logger that reports fold
//! and epoch progress during cross-validation.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Subscriber settings for the CLI and tests
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is unset
    pub level: Level,
    pub timestamps: bool,
    /// Print module paths
    pub include_target: bool,
    /// Print thread ids, useful to see the loader pool at work
    pub include_thread_ids: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            timestamps: true,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
            ..Self::default()
        }
    }

    /// Errors only, no timestamps
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            timestamps: false,
            ..Self::default()
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level` when it is set. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .with_ansi(config.ansi_colors)
        .compact();

    let installed = if config.timestamps {
        tracing::subscriber::set_global_default(builder.finish())
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())
    };

    installed.map_err(|e| format!("logging already initialized: {}", e))
}

/// Per-fold progress logger
pub struct EpochLogger {
    fold: usize,
    total_folds: usize,
    total_epochs: usize,
    epoch_start: Instant,
    fold_start: Instant,
}

/// Values reported at the end of an epoch
#[derive(Debug, Clone, Copy)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub learning_rate: f64,
}

impl EpochLogger {
    pub fn new(fold: usize, total_folds: usize, total_epochs: usize) -> Self {
        Self {
            fold,
            total_folds,
            total_epochs,
            epoch_start: Instant::now(),
            fold_start: Instant::now(),
        }
    }

    pub fn start_fold(&mut self, train_size: usize, val_size: usize) {
        self.fold_start = Instant::now();
        tracing::info!(
            "Fold {}/{} started: {} train / {} validation samples",
            self.fold,
            self.total_folds,
            train_size,
            val_size
        );
    }

    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch_start = Instant::now();
        tracing::debug!(
            "Fold {} epoch {}/{} started",
            self.fold,
            epoch,
            self.total_epochs
        );
    }

    pub fn end_epoch(&self, summary: &EpochSummary) {
        tracing::info!(
            "Fold {} epoch {}/{} in {:.1}s | Train loss: {:.4} | Val loss: {:.4} | P: {:.4} R: {:.4} F1: {:.4} | LR: {:.2e}",
            self.fold,
            summary.epoch,
            self.total_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            summary.train_loss,
            summary.val_loss,
            summary.precision,
            summary.recall,
            summary.f1,
            summary.learning_rate
        );
    }

    pub fn log_new_best(&self, epoch: usize, val_loss: f64) {
        tracing::info!(
            "Fold {}: new best validation loss {:.4} at epoch {}",
            self.fold,
            val_loss,
            epoch
        );
    }

    pub fn log_early_stop(&self, epoch: usize, patience: usize) {
        tracing::warn!(
            "Fold {}: early stopping after epoch {} ({} epoch(s) without improvement)",
            self.fold,
            epoch,
            patience
        );
    }

    pub fn end_fold(&self, accuracy: f64, f1: f64) {
        tracing::info!(
            "Fold {}/{} finished in {:.1}s | Accuracy: {:.2}% | F1: {:.4}",
            self.fold,
            self.total_folds,
            self.fold_start.elapsed().as_secs_f64(),
            accuracy * 100.0,
            f1
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert_eq!(LogConfig::verbose().level, Level::DEBUG);
        assert!(LogConfig::verbose().include_thread_ids);
        assert!(!LogConfig::quiet().timestamps);
    }

    #[test]
    fn test_epoch_logger_tracks_fold() {
        let mut logger = EpochLogger::new(2, 6, 10);
        logger.start_fold(100, 20);
        logger.start_epoch(1);
        logger.end_epoch(&EpochSummary {
            epoch: 1,
            train_loss: 0.7,
            val_loss: 0.6,
            precision: 0.5,
            recall: 0.5,
            f1: 0.5,
            learning_rate: 1e-5,
        });
        assert_eq!(logger.fold, 2);
        assert_eq!(logger.total_epochs, 10);
    }
}
