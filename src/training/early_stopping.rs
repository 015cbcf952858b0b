//! Early stopping on validation loss
//!
//! A fold stops once `patience` consecutive epochs fail to strictly improve
//! on the best validation loss. The parameters of the best epoch are kept
//! as an owned [`BestState`] value and restored after the epoch loop.

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: Option<usize>,
    counter: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            best_epoch: None,
            counter: 0,
        }
    }

    /// Record an epoch's validation loss; returns `true` on strict improvement
    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> bool {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.best_epoch = Some(epoch);
            self.counter = 0;
            true
        } else {
            self.counter += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.counter >= self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.counter
    }
}

/// Snapshot of the parameters at the best epoch so far
#[derive(Debug, Clone)]
pub struct BestState<R> {
    pub epoch: usize,
    pub val_loss: f64,
    pub record: R,
}

impl<R> BestState<R> {
    pub fn new(epoch: usize, val_loss: f64, record: R) -> Self {
        Self {
            epoch,
            val_loss,
            record,
        }
    }
}
