//! Stage kind and batch status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The capability a stage exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Turns a frame into another frame with the same rows.
    Transform,
    /// Turns a frame into one prediction per row. Only valid as the last stage.
    Predict,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform => write!(f, "transform"),
            Self::Predict => write!(f, "predict"),
        }
    }
}

/// Outcome of scoring one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every row of the batch was scored.
    Scored,
    /// The pipeline failed on the batch.
    Failed,
    /// The batch was dispatched but skipped because the run was cancelled.
    Cancelled,
}

impl BatchStatus {
    /// Returns true if the batch produced scores.
    #[must_use]
    pub fn is_scored(&self) -> bool {
        matches!(self, Self::Scored)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scored => write!(f, "scored"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Transform.to_string(), "transform");
        assert_eq!(StageKind::Predict.to_string(), "predict");
    }

    #[test]
    fn test_stage_kind_serde() {
        let json = serde_json::to_string(&StageKind::Predict).unwrap();
        assert_eq!(json, "\"predict\"");
    }

    #[test]
    fn test_batch_status() {
        assert!(BatchStatus::Scored.is_scored());
        assert!(!BatchStatus::Failed.is_scored());
        assert_eq!(BatchStatus::Cancelled.to_string(), "cancelled");
    }
}
