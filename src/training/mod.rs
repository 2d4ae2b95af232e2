//! Model training
//!
//! One trial = one complete training run under a single sampled
//! configuration: Adam-driven epochs over shuffled mini-batches, per-epoch
//! validation, and a report message back to the search coordinator.

mod adam;
mod metrics;
mod trial;

pub use adam::{Adam, AdamState};
pub use metrics::{batch_accuracy, batch_mae, evaluate};
pub use trial::{ResumeState, TrialPhase, TrialReport, TrialRunner};
