//! Per-row scores and the ordered result collection.

use crate::pipeline::ScoreSummary;
use serde::{Deserialize, Serialize};

/// The score of a single dataset row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// The pipeline's prediction for the row.
    Value(f64),
    /// The row belonged to a batch whose pipeline invocation failed.
    Failed,
}

impl Score {
    /// Returns the prediction, or `None` for failed rows.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Failed => None,
        }
    }

    /// Returns true if the row failed to score.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

/// Scores for every dataset row, in dataset row order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreCollection {
    /// One score per input row.
    pub scores: Vec<Score>,
    /// Run statistics and failure records.
    pub summary: ScoreSummary,
}

impl ScoreCollection {
    /// Returns the number of scored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Iterates over the scores in row order.
    pub fn iter(&self) -> std::slice::Iter<'_, Score> {
        self.scores.iter()
    }

    /// Returns the predictions, with `None` for failed rows.
    #[must_use]
    pub fn values(&self) -> Vec<Option<f64>> {
        self.scores.iter().map(Score::value).collect()
    }

    /// Returns the number of rows marked as failed.
    #[must_use]
    pub fn failed_rows(&self) -> usize {
        self.scores.iter().filter(|s| s.is_failed()).count()
    }
}

impl<'a> IntoIterator for &'a ScoreCollection {
    type Item = &'a Score;
    type IntoIter = std::slice::Iter<'a, Score>;

    fn into_iter(self) -> Self::IntoIter {
        self.scores.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_accessors() {
        assert_eq!(Score::Value(1.5).value(), Some(1.5));
        assert_eq!(Score::Failed.value(), None);
        assert!(Score::Failed.is_failed());
        assert_eq!(Score::from(2.0), Score::Value(2.0));
    }

    #[test]
    fn test_collection_counts() {
        let collection = ScoreCollection {
            scores: vec![Score::Value(1.0), Score::Failed, Score::Value(0.0)],
            summary: ScoreSummary::default(),
        };

        assert_eq!(collection.len(), 3);
        assert_eq!(collection.failed_rows(), 1);
        assert_eq!(collection.values(), vec![Some(1.0), None, Some(0.0)]);
        assert_eq!(collection.iter().count(), 3);
    }

    #[test]
    fn test_score_serde() {
        let json = serde_json::to_string(&vec![Score::Value(1.0), Score::Failed]).unwrap();
        assert_eq!(json, r#"[{"value":1.0},"failed"]"#);
    }
}
