//! Task and model options

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SpareError};

/// Type of prediction task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    /// Binary classification (sigmoid output, BCE loss)
    Classification,
    /// Regression (ReLU output, L1 loss)
    Regression,
}

impl TaskType {
    /// Whether this task is classification
    pub fn is_classification(&self) -> bool {
        matches!(self, TaskType::Classification)
    }

    /// Name of the headline metric used for trial scheduling
    pub fn headline_metric(&self) -> &'static str {
        match self {
            TaskType::Classification => "Accuracy",
            TaskType::Regression => "MAE",
        }
    }
}

impl Default for TaskType {
    fn default() -> Self {
        TaskType::Regression
    }
}

impl FromStr for TaskType {
    type Err = SpareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Classification" => Ok(TaskType::Classification),
            "Regression" => Ok(TaskType::Regression),
            other => Err(SpareError::ConfigError(format!(
                "only 'Classification' and 'Regression' tasks are supported, got '{other}'"
            ))),
        }
    }
}

/// Options recognized by the model manager.
///
/// Every option has a default; the typed record is the only way state enters
/// the model (no dynamic attributes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Prediction task
    pub task: TaskType,
    /// Data-parallel lanes per trial (accelerator slots in the original design)
    pub accelerators: usize,
    /// CPU workers per trial
    pub cpus: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Total training epochs per trial
    pub num_epochs: usize,
    /// Seed for the train/validation split and search sampling
    pub seed: u64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            task: TaskType::Regression,
            accelerators: 1,
            cpus: 1,
            batch_size: 128,
            num_epochs: 100,
            seed: 42,
        }
    }
}

impl ModelOptions {
    /// Create options with the given task and defaults for everything else
    pub fn new(task: TaskType) -> Self {
        Self { task, ..Default::default() }
    }

    /// Builder method to set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the epoch count
    pub fn with_num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Builder method to set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the per-trial CPU worker count
    pub fn with_cpus(mut self, cpus: usize) -> Self {
        self.cpus = cpus;
        self
    }

    /// Parse options from string key/value pairs at the configuration boundary.
    ///
    /// An unrecognized key is ignored with a warning. A non-integer value for
    /// an integer option is ignored with a warning, keeping the default. An
    /// invalid task value is a fatal configuration error.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut options = Self::default();

        for &(key, value) in pairs {
            match key {
                "task" => options.task = value.parse()?,
                "accelerators" => Self::parse_count(key, value, &mut options.accelerators),
                "cpus" => Self::parse_count(key, value, &mut options.cpus),
                "batch_size" => Self::parse_count(key, value, &mut options.batch_size),
                "num_epochs" => Self::parse_count(key, value, &mut options.num_epochs),
                "seed" => match value.parse::<u64>() {
                    Ok(v) => options.seed = v,
                    Err(_) => warn!("option 'seed' expects an integer, got '{value}'; keeping default"),
                },
                other => {
                    warn!("option '{other}' is not recognized for MlpModel, ignoring");
                }
            }
        }

        Ok(options)
    }

    fn parse_count(key: &str, value: &str, slot: &mut usize) {
        match value.parse::<usize>() {
            Ok(v) => *slot = v,
            Err(_) => warn!("option '{key}' expects an integer, got '{value}'; keeping default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ModelOptions::default();
        assert_eq!(options.task, TaskType::Regression);
        assert_eq!(options.batch_size, 128);
        assert_eq!(options.num_epochs, 100);
        assert_eq!(options.seed, 42);
    }

    #[test]
    fn test_task_from_str() {
        assert_eq!("Classification".parse::<TaskType>().unwrap(), TaskType::Classification);
        assert_eq!("Regression".parse::<TaskType>().unwrap(), TaskType::Regression);
        assert!("Clustering".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_from_pairs_applies_known_keys() {
        let options = ModelOptions::from_pairs(&[
            ("task", "Classification"),
            ("batch_size", "64"),
            ("num_epochs", "20"),
        ])
        .unwrap();

        assert_eq!(options.task, TaskType::Classification);
        assert_eq!(options.batch_size, 64);
        assert_eq!(options.num_epochs, 20);
    }

    #[test]
    fn test_from_pairs_ignores_unknown_key() {
        let options = ModelOptions::from_pairs(&[("kernel", "linear")]).unwrap();
        assert_eq!(options, ModelOptions::default());
    }

    #[test]
    fn test_from_pairs_non_integer_keeps_default() {
        let options = ModelOptions::from_pairs(&[("batch_size", "lots")]).unwrap();
        assert_eq!(options.batch_size, 128);
    }

    #[test]
    fn test_from_pairs_invalid_task_is_fatal() {
        let result = ModelOptions::from_pairs(&[("task", "Ranking")]);
        assert!(matches!(result, Err(SpareError::ConfigError(_))));
    }

    #[test]
    fn test_headline_metric() {
        assert_eq!(TaskType::Classification.headline_metric(), "Accuracy");
        assert_eq!(TaskType::Regression.headline_metric(), "MAE");
    }
}
