//! Consumers of ordered score chunks.

use crate::core::Score;
use crate::errors::SinkError;

/// Receives scores in dataset row order.
///
/// `accept` is called once per batch, from the scoring coordinator only, with
/// chunks whose offsets are strictly contiguous. Returning an error cancels
/// the run.
pub trait ResultSink: Send {
    /// Accepts the scores of rows `[offset, offset + scores.len())`.
    fn accept(&mut self, offset: usize, scores: &[Score]) -> Result<(), SinkError>;

    /// Called once after the last chunk of a successful run.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every score in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    scores: Vec<Score>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink with room for `rows` scores.
    #[must_use]
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            scores: Vec::with_capacity(rows),
        }
    }

    /// Scores received so far.
    #[must_use]
    pub fn scores(&self) -> &[Score] {
        &self.scores
    }

    /// Consumes the sink and returns its scores.
    #[must_use]
    pub fn into_scores(self) -> Vec<Score> {
        self.scores
    }
}

impl ResultSink for CollectingSink {
    fn accept(&mut self, offset: usize, scores: &[Score]) -> Result<(), SinkError> {
        if offset != self.scores.len() {
            return Err(SinkError::new(
                offset,
                format!("expected chunk at row {}", self.scores.len()),
            ));
        }
        self.scores.extend_from_slice(scores);
        Ok(())
    }
}

/// Counts rows without keeping them. Useful for dry runs and benchmarks.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSink {
    /// Rows accepted.
    pub rows: usize,
    /// Rows whose score is [`Score::Failed`].
    pub failed_rows: usize,
}

impl ResultSink for CountingSink {
    fn accept(&mut self, _offset: usize, scores: &[Score]) -> Result<(), SinkError> {
        self.rows += scores.len();
        self.failed_rows += scores.iter().filter(|s| s.is_failed()).count();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_appends() {
        let mut sink = CollectingSink::with_capacity(3);
        sink.accept(0, &[Score::Value(1.0), Score::Failed]).unwrap();
        sink.accept(2, &[Score::Value(3.0)]).unwrap();
        sink.finish().unwrap();
        assert_eq!(
            sink.into_scores(),
            vec![Score::Value(1.0), Score::Failed, Score::Value(3.0)]
        );
    }

    #[test]
    fn test_collecting_sink_rejects_gap() {
        let mut sink = CollectingSink::new();
        let err = sink.accept(5, &[Score::Value(1.0)]).unwrap_err();
        assert_eq!(err.offset, 5);
        assert!(sink.scores().is_empty());
    }

    #[test]
    fn test_counting_sink() {
        let mut sink = CountingSink::default();
        sink.accept(0, &[Score::Value(1.0), Score::Failed, Score::Failed]).unwrap();
        assert_eq!(sink.rows, 3);
        assert_eq!(sink.failed_rows, 2);
    }
}
