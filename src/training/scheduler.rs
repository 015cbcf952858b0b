//! Learning rate scheduling
//!
//! Schedules are evaluated per optimizer step. `LinearWarmupDecay` ramps
//! linearly from 0 to the base rate over the warmup steps, then decays
//! linearly to 0 at `total_steps`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Same rate for every step
    Constant { lr: f64 },

    LinearWarmupDecay {
        base_lr: f64,
        warmup_steps: usize,
        total_steps: usize,
    },
}

impl LrSchedule {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    pub fn linear_warmup_decay(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self::LinearWarmupDecay {
            base_lr,
            warmup_steps,
            total_steps,
        }
    }

    /// Learning rate used for optimizer step `step` (zero-based)
    pub fn lr_at(&self, step: usize) -> f64 {
        match *self {
            LrSchedule::Constant { lr } => lr,
            LrSchedule::LinearWarmupDecay {
                base_lr,
                warmup_steps,
                total_steps,
            } => {
                if step < warmup_steps {
                    return base_lr * step as f64 / warmup_steps as f64;
                }
                let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
                let remaining = total_steps.saturating_sub(step);
                base_lr * (remaining as f64 / decay_steps as f64).max(0.0)
            }
        }
    }
}

/// A schedule plus its step counter
#[derive(Debug, Clone)]
pub struct StepScheduler {
    schedule: LrSchedule,
    step: usize,
}

impl StepScheduler {
    pub fn new(schedule: LrSchedule) -> Self {
        Self { schedule, step: 0 }
    }

    /// Rate for the next optimizer step
    pub fn current_lr(&self) -> f64 {
        self.schedule.lr_at(self.step)
    }

    /// Advance by one optimizer step; returns the new rate
    pub fn step(&mut self) -> f64 {
        self.step += 1;
        self.current_lr()
    }

    pub fn steps_taken(&self) -> usize {
        self.step
    }
}
