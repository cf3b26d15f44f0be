//! Restores dataset order for batches that complete out of order.

use crate::core::Score;
use crate::errors::DataSourceError;
use std::collections::BTreeMap;

/// Scores of one batch, ready to hand to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedChunk {
    /// Batch index.
    pub batch_index: usize,
    /// First dataset row of the chunk.
    pub offset: usize,
    /// One score per row.
    pub scores: Vec<Score>,
}

/// Holds completed batches until every lower-indexed batch has been released.
///
/// Memory is bounded by the number of batches in flight, since at most that
/// many can finish ahead of the next index to release.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    next_index: usize,
    released_rows: usize,
    pending: BTreeMap<usize, ReleasedChunk>,
}

impl ReorderBuffer {
    /// Creates an empty buffer expecting batch 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a completed batch.
    ///
    /// # Errors
    ///
    /// Returns `Inconsistent` if the index was already released or is
    /// already pending.
    pub fn insert(&mut self, batch_index: usize, offset: usize, scores: Vec<Score>) -> Result<(), DataSourceError> {
        if batch_index < self.next_index || self.pending.contains_key(&batch_index) {
            return Err(DataSourceError::Inconsistent(format!(
                "batch {batch_index} was produced twice"
            )));
        }
        self.pending.insert(
            batch_index,
            ReleasedChunk {
                batch_index,
                offset,
                scores,
            },
        );
        Ok(())
    }

    /// Removes the next batch in index order, if it has completed.
    ///
    /// # Errors
    ///
    /// Returns `Inconsistent` if the batch does not start where the previous
    /// one ended.
    pub fn pop_ready(&mut self) -> Result<Option<ReleasedChunk>, DataSourceError> {
        let Some(chunk) = self.pending.remove(&self.next_index) else {
            return Ok(None);
        };
        if chunk.offset != self.released_rows {
            return Err(DataSourceError::Inconsistent(format!(
                "batch {} starts at row {} but {} rows precede it",
                chunk.batch_index, chunk.offset, self.released_rows
            )));
        }
        self.next_index += 1;
        self.released_rows += chunk.scores.len();
        Ok(Some(chunk))
    }

    /// Index of the next batch to release.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Rows released so far.
    #[must_use]
    pub fn released_rows(&self) -> usize {
        self.released_rows
    }

    /// Batches waiting on a lower index.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
