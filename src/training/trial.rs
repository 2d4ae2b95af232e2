//! Trial runner
//!
//! Executes one training configuration for a bounded number of epochs,
//! snapshotting network and optimizer state each epoch and reporting
//! validation loss and the headline metric to the search coordinator.

use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::Array1;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TaskType;
use crate::data::{BatchIterator, TabularDataset};
use crate::error::{Result, SpareError};
use crate::network::{NetworkConfig, NetworkState, SpareNet};

use super::adam::{Adam, AdamState};
use super::metrics::{batch_accuracy, batch_mae};

/// Phase of a running trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    Initializing,
    TrainingEpoch,
    ValidatingEpoch,
    Reporting,
    Completed,
}

/// Input to a resumed trial: the state snapshot to continue from.
///
/// `epoch` is the epoch index recorded at snapshot time; a resumed trial
/// continues from that index, so a trial resumed at epoch 5 of 10 runs five
/// more epochs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeState {
    pub epoch: usize,
    pub network: NetworkState,
    pub optimizer: AdamState,
}

/// Per-epoch output of a trial: validation results plus the state snapshot
/// that makes the epoch resumable and the winning model materializable.
#[derive(Debug, Clone)]
pub struct TrialReport {
    pub trial_id: usize,
    pub epoch: usize,
    pub loss: f64,
    pub metric: f64,
    pub network: NetworkState,
    pub optimizer: AdamState,
}

/// Runs one trial to completion, early stop, or failure
pub struct TrialRunner<'a> {
    trial_id: usize,
    config: NetworkConfig,
    task: TaskType,
    train: &'a TabularDataset,
    val: &'a TabularDataset,
    batch_size: usize,
    num_epochs: usize,
    seed: u64,
    phase: TrialPhase,
}

impl<'a> TrialRunner<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trial_id: usize,
        config: NetworkConfig,
        task: TaskType,
        train: &'a TabularDataset,
        val: &'a TabularDataset,
        batch_size: usize,
        num_epochs: usize,
        seed: u64,
    ) -> Self {
        Self {
            trial_id,
            config,
            task,
            train,
            val,
            batch_size,
            num_epochs,
            seed,
            phase: TrialPhase::Initializing,
        }
    }

    /// Current phase, for logging and tests
    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    /// Run the trial.
    ///
    /// `report` is invoked once per epoch with the trial's report message.
    /// `stop` is the coordinator's cooperative cancellation flag, checked at
    /// epoch boundaries only. Any training failure aborts this trial alone.
    pub fn run<F>(mut self, resume: Option<ResumeState>, mut report: F, stop: &AtomicBool) -> Result<()>
    where
        F: FnMut(TrialReport),
    {
        self.phase = TrialPhase::Initializing;
        let mut net = SpareNet::new(
            self.train.num_features(),
            self.config.clone(),
            self.task,
            self.seed,
        );
        let mut adam = Adam::new(self.config.learning_rate, &net);
        let start_epoch = match resume {
            Some(state) => {
                net.load_state(&state.network)?;
                adam.load_state(&state.optimizer)?;
                state.epoch
            }
            None => 0,
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(0x9e37_79b9_7f4a_7c15));
        let mut train_batches = BatchIterator::new(self.batch_size, true, self.seed);
        let mut val_batches = BatchIterator::new(self.batch_size, false, self.seed);

        for epoch in start_epoch..self.num_epochs {
            self.phase = TrialPhase::TrainingEpoch;
            for (x, y) in train_batches.epoch(self.train) {
                let cache = net.forward_train(&x, &mut rng);
                let loss = task_loss(&cache.out, &y, self.task);
                if !loss.is_finite() {
                    return Err(SpareError::TrainingError(format!(
                        "trial {}: non-finite training loss at epoch {epoch}",
                        self.trial_id
                    )));
                }
                let delta = output_delta(&cache.out, &y, self.task);
                let grads = net.backward(&x, &cache, &delta);
                adam.step(&mut net, &grads);
            }

            self.phase = TrialPhase::ValidatingEpoch;
            let mut val_loss = 0.0;
            let mut val_metric = 0.0;
            let mut val_steps = 0usize;
            for (x, y) in val_batches.epoch(self.val) {
                let out = net.forward_eval(&x);
                val_loss += task_loss(&out, &y, self.task);
                val_metric += match self.task {
                    TaskType::Classification => batch_accuracy(&out, &y),
                    TaskType::Regression => batch_mae(&out, &y),
                };
                val_steps += 1;
            }
            let val_loss = val_loss / val_steps as f64;
            let val_metric = val_metric / val_steps as f64;

            self.phase = TrialPhase::Reporting;
            report(TrialReport {
                trial_id: self.trial_id,
                epoch,
                loss: val_loss,
                metric: val_metric,
                network: net.state(),
                optimizer: adam.state(),
            });

            if stop.load(Ordering::Relaxed) {
                debug!("trial {} stopped at epoch {}", self.trial_id, epoch);
                break;
            }
        }

        self.phase = TrialPhase::Completed;
        Ok(())
    }
}

/// Task loss: binary cross-entropy (classification) or L1 (regression)
pub(crate) fn task_loss(out: &Array1<f32>, y: &Array1<f32>, task: TaskType) -> f64 {
    let n = y.len() as f64;
    match task {
        TaskType::Classification => {
            out.iter()
                .zip(y.iter())
                .map(|(&p, &t)| {
                    let p = (p as f64).clamp(1e-7, 1.0 - 1e-7);
                    -(t as f64 * p.ln() + (1.0 - t as f64) * (1.0 - p).ln())
                })
                .sum::<f64>()
                / n
        }
        TaskType::Regression => {
            out.iter()
                .zip(y.iter())
                .map(|(&p, &t)| (p as f64 - t as f64).abs())
                .sum::<f64>()
                / n
        }
    }
}

/// Loss gradient with respect to the final pre-activation, fused with the
/// terminal activation (sigmoid + BCE, or ReLU + L1).
pub(crate) fn output_delta(out: &Array1<f32>, y: &Array1<f32>, task: TaskType) -> Array1<f32> {
    let n = y.len() as f32;
    match task {
        TaskType::Classification => (out - y) / n,
        TaskType::Regression => Array1::from_iter(out.iter().zip(y.iter()).map(|(&p, &t)| {
            if p > 0.0 {
                let d = p - t;
                if d > 0.0 {
                    1.0 / n
                } else if d < 0.0 {
                    -1.0 / n
                } else {
                    0.0
                }
            } else {
                // Dead ReLU head: no gradient flows.
                0.0
            }
        })),
    }
}
