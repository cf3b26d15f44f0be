//! Lifecycle events emitted by scoring runs.
//!
//! Events complement `tracing` logs: sinks receive typed events they can
//! forward to metrics or analytics without parsing log lines.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::pipeline::FailurePolicy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scoring lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringEvent {
    /// The run has started.
    Started {
        /// Run identifier.
        run_id: Uuid,
        /// Rows announced by the source.
        total_rows: usize,
        /// Batches the source will yield.
        expected_batches: usize,
        /// Rows per batch.
        batch_size: usize,
        /// Worker cap.
        max_workers: usize,
        /// Failure policy in effect.
        policy: FailurePolicy,
    },
    /// A batch was scored.
    BatchCompleted {
        /// Run identifier.
        run_id: Uuid,
        /// Index of the batch.
        batch_index: usize,
        /// Rows in the batch.
        rows: usize,
    },
    /// A batch failed to score.
    BatchFailed {
        /// Run identifier.
        run_id: Uuid,
        /// Index of the batch.
        batch_index: usize,
        /// First row of the batch.
        offset: usize,
        /// Rows in the batch.
        rows: usize,
        /// Failing stage name.
        stage: String,
        /// Error message.
        error: String,
    },
    /// The run was cancelled before finishing.
    Cancelled {
        /// Run identifier.
        run_id: Uuid,
        /// Why.
        reason: String,
    },
    /// The run finished and every row was released.
    Completed {
        /// Run identifier.
        run_id: Uuid,
        /// Batches scored.
        completed_batches: usize,
        /// Batches marked failed.
        failed_batches: usize,
        /// Rows released.
        total_rows: usize,
        /// Run duration.
        duration_ms: u64,
    },
}

impl ScoringEvent {
    /// Dotted event type, e.g. `batch.failed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "scoring.started",
            Self::BatchCompleted { .. } => "batch.completed",
            Self::BatchFailed { .. } => "batch.failed",
            Self::Cancelled { .. } => "scoring.cancelled",
            Self::Completed { .. } => "scoring.completed",
        }
    }

    /// The run the event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Started { run_id, .. }
            | Self::BatchCompleted { run_id, .. }
            | Self::BatchFailed { run_id, .. }
            | Self::Cancelled { run_id, .. }
            | Self::Completed { run_id, .. } => *run_id,
        }
    }
}
