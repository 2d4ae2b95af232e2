//! Hyperparameter search
//!
//! A fixed search space is sampled into trial configurations; trials run
//! concurrently under a resource plan and report per-epoch validation
//! results; an asynchronous successive-halving scheduler cancels
//! underperformers at rung boundaries; the winner is the trial with the
//! lowest last-reported validation loss.

mod coordinator;
mod scheduler;
mod space;

pub use coordinator::{SearchConfig, SearchCoordinator, TrialResult};
pub use scheduler::{AshaScheduler, SchedulerDecision};
pub use space::SearchSpace;
