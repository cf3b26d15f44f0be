//! Cooperative cancellation for scoring runs.

mod token;

pub use token::{CancelReason, CancellationToken};
