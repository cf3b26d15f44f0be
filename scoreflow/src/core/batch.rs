//! Batches: contiguous dataset slices tagged with their enumeration index.

use super::Frame;

/// A bounded, ordered slice of the dataset processed as one unit of work.
///
/// Batch `index` covers rows `[offset, offset + len)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of the batch in the source's enumeration.
    pub index: usize,
    /// First dataset row contained in the batch.
    pub offset: usize,
    /// The batch records.
    pub frame: Frame,
}

impl Batch {
    /// Creates a new batch.
    #[must_use]
    pub fn new(index: usize, offset: usize, frame: Frame) -> Self {
        Self {
            index,
            offset,
            frame,
        }
    }

    /// Returns the number of rows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frame.num_rows()
    }

    /// Returns true if the batch has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    /// Returns the row range covered by the batch.
    #[must_use]
    pub fn rows(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    #[test]
    fn test_batch_rows() {
        let frame = Frame::new(vec![Column::new("x", vec![0.0; 250])]).unwrap();
        let batch = Batch::new(3, 750, frame);

        assert_eq!(batch.len(), 250);
        assert_eq!(batch.rows(), 750..1000);
        assert!(!batch.is_empty());
    }
}
