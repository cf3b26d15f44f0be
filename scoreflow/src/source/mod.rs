//! Batch sources: lazy, finite, single-pass sequences of contiguous batches.
//!
//! Batch `k` of a source with batch size `S` over `n` rows always holds rows
//! `[k*S, min((k+1)*S, n))`. Only the last batch may be short.

mod memory;
mod parquet;

pub use self::parquet::{ColumnInfo, DatasetInfo, ParquetBatchSource};
pub use memory::FrameBatchSource;

use crate::core::Batch;
use crate::errors::{ConfigurationError, DataSourceError};
use serde::{Deserialize, Serialize};

/// A single-pass producer of batches.
///
/// Sources are not shared: one dispatching thread iterates a source and
/// hands each batch to exactly one worker. After yielding an error a source
/// yields nothing more.
pub trait BatchSource: Iterator<Item = Result<Batch, DataSourceError>> + Send {
    /// Rows per batch.
    fn batch_size(&self) -> usize;

    /// Total rows the source will yield, known without reading the data.
    fn total_rows(&self) -> usize;

    /// Number of batches the source will yield.
    fn expected_batches(&self) -> usize {
        self.total_rows().div_ceil(self.batch_size())
    }
}

/// Rejects a zero batch size.
pub(crate) fn check_batch_size(batch_size: usize) -> Result<(), ConfigurationError> {
    if batch_size == 0 {
        Err(ConfigurationError::InvalidBatchSize(batch_size))
    } else {
        Ok(())
    }
}

/// Options for opening a Parquet dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParquetSourceOptions {
    /// Columns to read, in the order stages will see them. `None` reads every
    /// numeric and boolean column in file order.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

impl ParquetSourceOptions {
    /// Creates options that read every numeric column.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts reading to the named columns.
    #[must_use]
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_batch_size() {
        assert!(check_batch_size(1).is_ok());
        assert!(matches!(
            check_batch_size(0),
            Err(ConfigurationError::InvalidBatchSize(0))
        ));
    }

    #[test]
    fn test_options_deserialize() {
        let options: ParquetSourceOptions =
            serde_json::from_str(r#"{"columns": ["vibration_x", "vibration_y"]}"#).unwrap();
        assert_eq!(
            options,
            ParquetSourceOptions::new().with_columns(["vibration_x", "vibration_y"])
        );
        let default: ParquetSourceOptions = serde_json::from_str("{}").unwrap();
        assert!(default.columns.is_none());
    }
}
