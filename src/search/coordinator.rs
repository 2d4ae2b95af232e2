//! Search coordinator
//!
//! Runs sampled trials on worker threads under a resource plan. Trials share
//! no mutable state; coordination is message-based: each trial sends a
//! per-epoch report over a channel and blocks until the coordinator answers
//! with the scheduler's decision, so a cancelled trial stops at exactly the
//! epoch that triggered the decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TaskType;
use crate::data::TabularDataset;
use crate::device::{ComputeResources, ResourcePlan};
use crate::error::{Result, SpareError};
use crate::network::{NetworkConfig, NetworkState};
use crate::training::{TrialReport, TrialRunner};

use super::scheduler::{AshaScheduler, SchedulerDecision};
use super::space::SearchSpace;

/// Search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of configurations sampled from the space
    pub num_trials: usize,
    /// Epochs a trial is guaranteed before it can be stopped
    pub grace_period: usize,
    /// Successive-halving reduction factor
    pub reduction_factor: usize,
    /// Seed for configuration sampling and per-trial initialization
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { num_trials: 10, grace_period: 1, reduction_factor: 2, seed: 42 }
    }
}

impl SearchConfig {
    /// Builder method to set the trial count
    pub fn with_num_trials(mut self, n: usize) -> Self {
        self.num_trials = n;
        self
    }

    /// Builder method to set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Final record of one trial: its configuration and last reported state
#[derive(Debug, Clone)]
pub struct TrialResult {
    pub trial_id: usize,
    pub config: NetworkConfig,
    pub loss: f64,
    pub metric: f64,
    pub epoch: usize,
    pub network: NetworkState,
}

enum TrialEvent {
    Report {
        report: TrialReport,
        reply: mpsc::Sender<SchedulerDecision>,
    },
    Finished {
        trial_id: usize,
        error: Option<SpareError>,
    },
}

/// Launches trials, applies the scheduler, and selects the winner
pub struct SearchCoordinator {
    config: SearchConfig,
    plan: ResourcePlan,
    resources: ComputeResources,
}

impl SearchCoordinator {
    pub fn new(config: SearchConfig, plan: ResourcePlan, resources: ComputeResources) -> Self {
        Self { config, plan, resources }
    }

    /// Run the full search and return the winning trial.
    ///
    /// The winner is the trial with the minimum **last** reported validation
    /// loss, across completed, stopped, and failed-after-reporting trials.
    /// Errors with "no viable model" when no trial ever reported.
    pub fn run(
        &self,
        task: TaskType,
        train: &TabularDataset,
        val: &TabularDataset,
        batch_size: usize,
        num_epochs: usize,
    ) -> Result<TrialResult> {
        let configs = SearchSpace::new(self.config.seed).sample_many(self.config.num_trials);
        let mut scheduler = AshaScheduler::new(
            self.config.grace_period,
            self.config.reduction_factor,
            num_epochs,
        );
        let mut latest: Vec<Option<TrialResult>> = vec![None; configs.len()];
        let max_parallel = self
            .plan
            .max_concurrent_trials(&self.resources)
            .min(configs.len())
            .max(1);

        info!(
            "searching {} configurations, up to {} concurrent trials, rungs {:?}",
            configs.len(),
            max_parallel,
            scheduler.rungs()
        );

        let (tx, rx) = mpsc::channel::<TrialEvent>();
        let mut failures = 0usize;

        thread::scope(|scope| {
            let spawn_trial = |trial_id: usize| {
                let config = configs[trial_id].clone();
                let tx = tx.clone();
                let trial_seed = self.config.seed.wrapping_add(trial_id as u64);
                scope.spawn(move || {
                    let runner = TrialRunner::new(
                        trial_id, config, task, train, val, batch_size, num_epochs, trial_seed,
                    );
                    let stop = AtomicBool::new(false);
                    let stop_ref = &stop;
                    let (decision_tx, decision_rx) = mpsc::channel::<SchedulerDecision>();
                    let report_tx = tx.clone();

                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        runner.run(
                            None,
                            move |report| {
                                let sent = report_tx
                                    .send(TrialEvent::Report { report, reply: decision_tx.clone() });
                                if sent.is_err() {
                                    stop_ref.store(true, Ordering::Relaxed);
                                    return;
                                }
                                // Block until the scheduler has judged this
                                // epoch; a Stop lands before the next epoch
                                // starts.
                                match decision_rx.recv() {
                                    Ok(SchedulerDecision::Continue) => {}
                                    _ => stop_ref.store(true, Ordering::Relaxed),
                                }
                            },
                            stop_ref,
                        )
                    }));
                    let error = match outcome {
                        Ok(Ok(())) => None,
                        Ok(Err(err)) => Some(err),
                        Err(_) => {
                            Some(SpareError::TrainingError(format!("trial {trial_id} aborted")))
                        }
                    };
                    let _ = tx.send(TrialEvent::Finished { trial_id, error });
                });
            };

            let mut next = 0usize;
            while next < max_parallel {
                spawn_trial(next);
                next += 1;
            }

            let mut finished = 0usize;
            while finished < configs.len() {
                match rx.recv() {
                    Ok(TrialEvent::Report { report, reply }) => {
                        let completed = report.epoch + 1;
                        let decision =
                            scheduler.on_report(report.trial_id, completed, report.loss);
                        if decision == SchedulerDecision::Stop {
                            debug!(
                                "stopping trial {} at rung {} (loss {:.6})",
                                report.trial_id, completed, report.loss
                            );
                        }
                        latest[report.trial_id] = Some(TrialResult {
                            trial_id: report.trial_id,
                            config: configs[report.trial_id].clone(),
                            loss: report.loss,
                            metric: report.metric,
                            epoch: report.epoch,
                            network: report.network,
                        });
                        let _ = reply.send(decision);
                    }
                    Ok(TrialEvent::Finished { trial_id, error }) => {
                        finished += 1;
                        if let Some(err) = error {
                            warn!("trial {trial_id} failed: {err}");
                            failures += 1;
                        }
                        if next < configs.len() {
                            spawn_trial(next);
                            next += 1;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        if failures > 0 {
            info!("{failures} of {} trials failed", configs.len());
        }

        let best = latest
            .into_iter()
            .flatten()
            .min_by(|a, b| a.loss.partial_cmp(&b.loss).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or_else(|| {
                SpareError::SearchError("no viable model: all trials failed".to_string())
            })?;

        info!(
            "best trial {}: config {:?}, final validation loss {:.6}, final validation metric {:.6}",
            best.trial_id, best.config, best.loss, best.metric
        );
        Ok(best)
    }
}
