//! spare-mlp - MLP training and hyperparameter search for SPARE scores
//!
//! Trains a small feed-forward network to predict a continuous or binary
//! clinical target from a fixed set of numeric predictors, searching over
//! network width, dropout, normalization, and learning rate with an
//! asynchronous successive-halving scheduler.
//!
//! # Modules
//!
//! - [`config`] - Task type and recognized model options
//! - [`data`] - Tabular dataset adapter and mini-batching
//! - [`preprocessing`] - Feature scaling fit on the training split
//! - [`network`] - The 3-layer predictor network
//! - [`training`] - Adam, the metrics evaluator, and the trial runner
//! - [`search`] - Search space, ASHA scheduler, and coordinator
//! - [`model`] - The model manager: `fit`, `predict`, `set_parameters`
//! - [`device`] - Explicit compute-resource planning
//!
//! # Example
//!
//! ```no_run
//! use polars::prelude::*;
//! use spare_mlp::prelude::*;
//!
//! # fn main() -> spare_mlp::Result<()> {
//! let df = df!(
//!     "id" => &["s1", "s2"],
//!     "roi1" => &[0.3, 0.7],
//!     "roi2" => &[0.1, 0.9],
//!     "age" => &[63.0, 71.0],
//! ).unwrap();
//!
//! let options = ModelOptions::from_pairs(&[("task", "Regression"), ("num_epochs", "50")])?;
//! let mut model = MlpModel::new(
//!     vec!["roi1".into(), "roi2".into()],
//!     "age",
//!     "id",
//!     options,
//! );
//! let outcome = model.fit(&df)?;
//! let scores = model.predict(&df)?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub mod config;
pub mod data;
pub mod device;
pub mod model;
pub mod network;
pub mod preprocessing;
pub mod search;
pub mod training;

pub use error::{Result, SpareError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ModelOptions, TaskType};
    pub use crate::data::{BatchIterator, TabularDataset};
    pub use crate::device::{ComputeResources, ResourcePlan};
    pub use crate::error::{Result, SpareError};
    pub use crate::model::{FitOutcome, MlpModel, ModelArtifact, ParameterUpdate};
    pub use crate::network::{NetworkConfig, NetworkState, NormKind, SpareNet};
    pub use crate::preprocessing::ColumnScaler;
    pub use crate::search::{SearchConfig, SearchCoordinator, TrialResult};
    pub use crate::training::{evaluate, Adam, ResumeState, TrialReport, TrialRunner};
}
