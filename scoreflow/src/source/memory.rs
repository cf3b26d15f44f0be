//! Batch source over an in-memory frame.

use super::{check_batch_size, BatchSource};
use crate::core::{Batch, Frame};
use crate::errors::{ConfigurationError, DataSourceError};

/// Splits an in-memory frame into batches.
#[derive(Debug, Clone)]
pub struct FrameBatchSource {
    remaining: Frame,
    batch_size: usize,
    total_rows: usize,
    next_index: usize,
    offset: usize,
}

impl FrameBatchSource {
    /// Creates a new source.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBatchSize` if `batch_size` is zero.
    pub fn new(frame: Frame, batch_size: usize) -> Result<Self, ConfigurationError> {
        check_batch_size(batch_size)?;
        Ok(Self {
            total_rows: frame.num_rows(),
            remaining: frame,
            batch_size,
            next_index: 0,
            offset: 0,
        })
    }
}

impl Iterator for FrameBatchSource {
    type Item = Result<Batch, DataSourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let frame = self.remaining.take_front(self.batch_size);
        let batch = Batch::new(self.next_index, self.offset, frame);
        self.next_index += 1;
        self.offset += batch.len();
        Some(Ok(batch))
    }
}

impl BatchSource for FrameBatchSource {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn total_rows(&self) -> usize {
        self.total_rows
    }
}
