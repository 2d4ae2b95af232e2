//! Compute resource model
//!
//! The original design selected a device through a process-wide
//! "accelerator if available" flag. Here the resource decision is an explicit
//! value made once per `fit` call and threaded through the search coordinator
//! to each trial runner.

use serde::{Deserialize, Serialize};

use crate::config::ModelOptions;

/// Compute resources available to a fit invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResources {
    /// Total CPU parallelism available to the process
    pub total_cpus: usize,
}

impl ComputeResources {
    /// Detect available parallelism
    pub fn detect() -> Self {
        let total_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { total_cpus }
    }

    /// Construct with an explicit CPU count
    pub fn with_total_cpus(total_cpus: usize) -> Self {
        Self { total_cpus: total_cpus.max(1) }
    }
}

/// Per-trial resource allocation.
///
/// `lanes_per_trial` is the data-parallel width granted to one trial: batch
/// math over large inputs is split into that many row chunks. There is no
/// dedicated accelerator backend in this stack, so accelerator slots map to
/// extra lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePlan {
    /// CPU slots reserved per trial
    pub cpus_per_trial: usize,
    /// Data-parallel lanes per trial
    pub lanes_per_trial: usize,
}

impl ResourcePlan {
    /// Derive the plan from model options (decided once per fit)
    pub fn from_options(options: &ModelOptions) -> Self {
        Self {
            cpus_per_trial: options.cpus.max(1),
            lanes_per_trial: options.accelerators.max(1),
        }
    }

    /// Number of trials that can run concurrently under this plan
    pub fn max_concurrent_trials(&self, resources: &ComputeResources) -> usize {
        (resources.total_cpus / self.cpus_per_trial).max(1)
    }
}

impl Default for ResourcePlan {
    fn default() -> Self {
        Self { cpus_per_trial: 1, lanes_per_trial: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_reports_at_least_one_cpu() {
        let resources = ComputeResources::detect();
        assert!(resources.total_cpus >= 1);
    }

    #[test]
    fn test_max_concurrent_trials() {
        let resources = ComputeResources::with_total_cpus(8);
        let plan = ResourcePlan { cpus_per_trial: 2, lanes_per_trial: 1 };
        assert_eq!(plan.max_concurrent_trials(&resources), 4);
    }

    #[test]
    fn test_max_concurrent_trials_never_zero() {
        let resources = ComputeResources::with_total_cpus(1);
        let plan = ResourcePlan { cpus_per_trial: 4, lanes_per_trial: 1 };
        assert_eq!(plan.max_concurrent_trials(&resources), 1);
    }

    #[test]
    fn test_plan_from_options_clamps_zero() {
        let options = ModelOptions { cpus: 0, accelerators: 0, ..Default::default() };
        let plan = ResourcePlan::from_options(&options);
        assert_eq!(plan.cpus_per_trial, 1);
        assert_eq!(plan.lanes_per_trial, 1);
    }
}
