//! Asynchronous successive-halving scheduler

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Decision returned for each trial report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerDecision {
    Continue,
    Stop,
}

/// Rung-based early stopping.
///
/// Rungs sit at completed-epoch counts grace, grace*rf, grace*rf^2, ...
/// A trial reaching a rung records its loss there; trials whose loss falls
/// outside the best 1/rf recorded at that rung so far are stopped. Decisions
/// are asynchronous: each trial is judged against whatever its peers have
/// reported by the time it arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AshaScheduler {
    grace_period: usize,
    reduction_factor: usize,
    rungs: Vec<usize>,
    records: HashMap<usize, Vec<(usize, f64)>>,
}

impl AshaScheduler {
    /// Build the rung ladder for a maximum epoch count
    pub fn new(grace_period: usize, reduction_factor: usize, max_epochs: usize) -> Self {
        let grace = grace_period.max(1);
        let rf = reduction_factor.max(2);

        let mut rungs = Vec::new();
        let mut rung = grace;
        while rung < max_epochs {
            rungs.push(rung);
            rung = rung.saturating_mul(rf);
        }

        Self {
            grace_period: grace,
            reduction_factor: rf,
            rungs,
            records: HashMap::new(),
        }
    }

    /// Epoch milestones at which trials are compared
    pub fn rungs(&self) -> &[usize] {
        &self.rungs
    }

    /// Record a report and decide the trial's fate.
    ///
    /// `completed_epochs` is the number of epochs the trial has finished
    /// (epoch index + 1).
    pub fn on_report(&mut self, trial_id: usize, completed_epochs: usize, loss: f64) -> SchedulerDecision {
        if !self.rungs.contains(&completed_epochs) {
            return SchedulerDecision::Continue;
        }

        let entries = self.records.entry(completed_epochs).or_default();
        entries.retain(|&(id, _)| id != trial_id);
        entries.push((trial_id, loss));

        let mut losses: Vec<f64> = entries.iter().map(|&(_, l)| l).collect();
        losses.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let keep = losses.len().div_ceil(self.reduction_factor);
        let rank = losses
            .iter()
            .position(|&l| l >= loss)
            .unwrap_or(losses.len());

        if rank >= keep {
            SchedulerDecision::Stop
        } else {
            SchedulerDecision::Continue
        }
    }
}
