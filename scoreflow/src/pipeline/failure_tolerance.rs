//! Failure policy and bookkeeping for batch scoring.
//!
//! Best-effort runs record each failed batch and keep going. Fail-fast runs
//! stop at the first recorded failure.

use crate::errors::BatchScoringError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How to handle a batch whose pipeline invocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Mark the batch's rows as failed and continue (default).
    #[default]
    BestEffort,
    /// Cancel remaining work on the first failure.
    FailFast,
}

/// Record of a failed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Index of the batch.
    pub batch_index: usize,
    /// First row of the batch.
    pub offset: usize,
    /// Number of rows in the batch.
    pub rows: usize,
    /// Position of the failing stage.
    pub stage_position: usize,
    /// Name of the failing stage.
    pub stage: String,
    /// Error message.
    pub error: String,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl BatchFailure {
    /// Creates a record from a batch scoring error.
    #[must_use]
    pub fn from_error(error: &BatchScoringError) -> Self {
        Self {
            batch_index: error.batch_index,
            offset: error.offset,
            rows: error.rows,
            stage_position: error.source.position,
            stage: error.source.stage.clone(),
            error: error.source.source.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Statistics for one scoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Batches dispatched.
    pub total_batches: usize,
    /// Batches scored successfully.
    pub completed_batches: usize,
    /// Batches whose rows were marked as failed.
    pub failed_batches: usize,
    /// Rows released to the sink.
    pub total_rows: usize,
    /// Rows marked as failed.
    pub failed_rows: usize,
    /// Failure records, ordered by batch index.
    pub failures: Vec<BatchFailure>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl ScoreSummary {
    /// Creates an empty summary for a new run.
    #[must_use]
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            ..Self::default()
        }
    }

    /// Returns the fraction of batches that scored successfully.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_batches == 0 {
            return 1.0;
        }
        self.completed_batches as f64 / self.total_batches as f64
    }

    /// Returns true if any batch failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Collects batch outcomes during a scoring run.
#[derive(Debug)]
pub struct FailureCollector {
    /// Failure policy.
    pub policy: FailurePolicy,
    summary: ScoreSummary,
}

impl FailureCollector {
    /// Creates a new collector for a run.
    #[must_use]
    pub fn new(policy: FailurePolicy, run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            policy,
            summary: ScoreSummary::new(run_id, started_at),
        }
    }

    /// Records a batch that scored successfully.
    pub fn record_completion(&mut self, rows: usize) {
        self.summary.total_batches += 1;
        self.summary.completed_batches += 1;
        self.summary.total_rows += rows;
    }

    /// Records a failed batch.
    pub fn record_failure(&mut self, error: &BatchScoringError) {
        self.summary.total_batches += 1;
        self.summary.failed_batches += 1;
        self.summary.total_rows += error.rows;
        self.summary.failed_rows += error.rows;
        let record = BatchFailure::from_error(error);
        let at = self
            .summary
            .failures
            .partition_point(|f| f.batch_index < record.batch_index);
        self.summary.failures.insert(at, record);
    }

    /// Returns true if the run must stop.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.policy {
            FailurePolicy::FailFast => self.summary.has_failures(),
            FailurePolicy::BestEffort => false,
        }
    }

    /// Number of batches scored successfully so far.
    #[must_use]
    pub fn completed_batches(&self) -> usize {
        self.summary.completed_batches
    }

    /// Returns all failures, ordered by batch index.
    #[must_use]
    pub fn failures(&self) -> &[BatchFailure] {
        &self.summary.failures
    }

    /// Finishes the run and returns its summary.
    #[must_use]
    pub fn finish(mut self, duration_ms: u64) -> ScoreSummary {
        self.summary.duration_ms = duration_ms;
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PipelineRunError, StageError};

    fn batch_error(batch_index: usize) -> BatchScoringError {
        BatchScoringError {
            batch_index,
            offset: batch_index * 10,
            rows: 10,
            source: PipelineRunError {
                position: 1,
                stage: "ns.Predictor".to_string(),
                source: StageError::failed("boom"),
            },
        }
    }

    fn collector(policy: FailurePolicy) -> FailureCollector {
        FailureCollector::new(policy, Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_failure_policy_default() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::BestEffort);
    }

    #[test]
    fn test_failure_policy_serde() {
        let policy: FailurePolicy = serde_json::from_str("\"fail_fast\"").unwrap();
        assert_eq!(policy, FailurePolicy::FailFast);
    }

    #[test]
    fn test_batch_failure_from_error() {
        let record = BatchFailure::from_error(&batch_error(3));
        assert_eq!(record.batch_index, 3);
        assert_eq!(record.offset, 30);
        assert_eq!(record.stage_position, 1);
        assert_eq!(record.stage, "ns.Predictor");
        assert_eq!(record.error, "boom");
    }

    #[test]
    fn test_collector_best_effort() {
        let mut collector = collector(FailurePolicy::BestEffort);
        collector.record_completion(10);
        collector.record_failure(&batch_error(1));

        assert!(!collector.should_stop());
        let summary = collector.finish(5);
        assert_eq!(summary.total_batches, 2);
        assert_eq!(summary.completed_batches, 1);
        assert_eq!(summary.failed_rows, 10);
        assert_eq!(summary.total_rows, 20);
        assert!((summary.success_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.duration_ms, 5);
    }

    #[test]
    fn test_collector_fail_fast() {
        let mut collector = collector(FailurePolicy::FailFast);
        assert!(!collector.should_stop());
        collector.record_failure(&batch_error(0));
        assert!(collector.should_stop());
    }

    #[test]
    fn test_failures_sorted_by_batch() {
        let mut collector = collector(FailurePolicy::BestEffort);
        collector.record_failure(&batch_error(4));
        collector.record_failure(&batch_error(1));
        collector.record_failure(&batch_error(2));

        let order: Vec<usize> = collector.failures().iter().map(|f| f.batch_index).collect();
        assert_eq!(order, vec![1, 2, 4]);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ScoreSummary::default();
        assert!(!summary.has_failures());
        assert!((summary.success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
