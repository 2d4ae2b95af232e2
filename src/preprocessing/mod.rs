//! Feature preprocessing
//!
//! The scaler is fit on the training split only and reused for validation,
//! final-stats computation, and later inference.

mod scaler;

pub use scaler::ColumnScaler;
