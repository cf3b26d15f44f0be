//! Streaming batch source over an Apache Parquet file.

use super::{check_batch_size, BatchSource, ParquetSourceOptions};
use crate::core::{Batch, Column, Frame};
use crate::errors::{DataSourceError, ScoreflowError};
use ::parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use ::parquet::arrow::ProjectionMask;
use arrow::array::{Array, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A column as described by the file footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Arrow data type, formatted.
    pub data_type: String,
    /// Whether the column can be read as `f64`.
    pub numeric: bool,
}

/// Dataset shape read from the file footer alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Dataset path.
    pub path: PathBuf,
    /// Total row count.
    pub num_rows: usize,
    /// Number of row groups.
    pub num_row_groups: usize,
    /// Top-level columns in file order.
    pub columns: Vec<ColumnInfo>,
}

fn is_readable(data_type: &DataType) -> bool {
    data_type.is_numeric() || *data_type == DataType::Boolean
}

/// An opened file with its projection resolved.
struct Prepared {
    builder: ParquetRecordBatchReaderBuilder<File>,
    columns: Vec<String>,
    total_rows: usize,
}

fn prepare(path: &Path, options: &ParquetSourceOptions) -> Result<Prepared, DataSourceError> {
    let open_error = |reason: String| DataSourceError::Open {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| open_error(e.to_string()))?;
    let total_rows = usize::try_from(builder.metadata().file_metadata().num_rows())
        .map_err(|_| open_error("negative row count in footer".to_string()))?;

    let schema = builder.schema().clone();
    let indices: Vec<usize> = match &options.columns {
        Some(requested) => requested
            .iter()
            .map(|name| {
                let (index, field) = schema.column_with_name(name).ok_or_else(|| {
                    DataSourceError::MissingColumn {
                        path: path.to_path_buf(),
                        column: name.clone(),
                    }
                })?;
                if is_readable(field.data_type()) {
                    Ok(index)
                } else {
                    Err(DataSourceError::UnsupportedColumn {
                        path: path.to_path_buf(),
                        column: name.clone(),
                        data_type: field.data_type().to_string(),
                    })
                }
            })
            .collect::<Result<_, _>>()?,
        None => schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| is_readable(f.data_type()))
            .map(|(i, _)| i)
            .collect(),
    };
    let columns = match &options.columns {
        Some(requested) => requested.clone(),
        None => indices.iter().map(|&i| schema.field(i).name().clone()).collect(),
    };

    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    Ok(Prepared {
        builder: builder.with_projection(mask),
        columns,
        total_rows,
    })
}

/// Converts a record batch to a frame with `columns` in order.
/// Nulls become `NaN`.
fn to_frame(batch: &RecordBatch, columns: &[String]) -> Result<Frame, String> {
    let converted = columns
        .iter()
        .map(|name| {
            let array = batch
                .column_by_name(name)
                .ok_or_else(|| format!("column '{name}' missing from decoded batch"))?;
            let floats = cast(array, &DataType::Float64).map_err(|e| e.to_string())?;
            let floats = floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| format!("column '{name}' did not cast to Float64"))?;
            let values = floats.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            Ok(Column::new(name.clone(), values))
        })
        .collect::<Result<Vec<_>, String>>()?;
    Frame::with_rows(batch.num_rows(), converted).map_err(|e| e.to_string())
}

/// Streams fixed-size batches from a Parquet file.
///
/// Reads at most `batch_size` rows per decode and re-chunks across row-group
/// boundaries, so peak memory stays proportional to the batch size.
pub struct ParquetBatchSource {
    path: PathBuf,
    batch_size: usize,
    total_rows: usize,
    columns: Vec<String>,
    reader: Option<ParquetRecordBatchReader>,
    buffer: Frame,
    next_index: usize,
    emitted_rows: usize,
    finished: bool,
}

impl ParquetBatchSource {
    /// Opens a dataset for streaming.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBatchSize` for a zero batch size, and `DataSource`
    /// errors when the file or its footer cannot be read or a requested
    /// column is missing or not numeric.
    pub fn open(
        path: impl AsRef<Path>,
        batch_size: usize,
        options: &ParquetSourceOptions,
    ) -> Result<Self, ScoreflowError> {
        check_batch_size(batch_size)?;
        let path = path.as_ref();
        let prepared = prepare(path, options)?;
        let reader = prepared
            .builder
            .with_batch_size(batch_size)
            .build()
            .map_err(|e| DataSourceError::Open {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!(
            path = %path.display(),
            total_rows = prepared.total_rows,
            batch_size,
            columns = ?prepared.columns,
            "Opened parquet batch source"
        );
        Ok(Self {
            path: path.to_path_buf(),
            batch_size,
            total_rows: prepared.total_rows,
            buffer: Frame::empty(&prepared.columns),
            columns: prepared.columns,
            reader: Some(reader),
            next_index: 0,
            emitted_rows: 0,
            finished: false,
        })
    }

    /// Reads row count and columns from the footer without decoding data.
    ///
    /// # Errors
    ///
    /// Returns `Open` if the file or its footer cannot be read.
    pub fn inspect(path: impl AsRef<Path>) -> Result<DatasetInfo, DataSourceError> {
        let path = path.as_ref();
        let open_error = |reason: String| DataSourceError::Open {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| open_error(e.to_string()))?;
        let metadata = builder.metadata();
        let num_rows = usize::try_from(metadata.file_metadata().num_rows())
            .map_err(|_| open_error("negative row count in footer".to_string()))?;
        let columns = builder
            .schema()
            .fields()
            .iter()
            .map(|f| ColumnInfo {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
                numeric: is_readable(f.data_type()),
            })
            .collect();
        Ok(DatasetInfo {
            path: path.to_path_buf(),
            num_rows,
            num_row_groups: metadata.num_row_groups(),
            columns,
        })
    }

    /// Reads the contiguous row range `[offset, offset + len)`, clipped to
    /// the dataset.
    ///
    /// # Errors
    ///
    /// As [`ParquetBatchSource::open`], plus `Read` if decoding fails.
    pub fn read_rows(
        path: impl AsRef<Path>,
        offset: usize,
        len: usize,
        options: &ParquetSourceOptions,
    ) -> Result<Frame, DataSourceError> {
        let path = path.as_ref();
        let prepared = prepare(path, options)?;
        let mut frame = Frame::empty(&prepared.columns);
        if len == 0 || offset >= prepared.total_rows {
            return Ok(frame);
        }
        let read_error = |reason: String| DataSourceError::Read {
            batch_index: 0,
            reason,
        };
        let reader = prepared
            .builder
            .with_offset(offset)
            .with_limit(len)
            .with_batch_size(len.min(prepared.total_rows - offset))
            .build()
            .map_err(|e| read_error(e.to_string()))?;
        for batch in reader {
            let batch = batch.map_err(|e| read_error(e.to_string()))?;
            let chunk = to_frame(&batch, &prepared.columns).map_err(read_error)?;
            frame.append(chunk).map_err(|e| read_error(e.to_string()))?;
        }
        Ok(frame)
    }

    /// Dataset path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Columns every batch carries, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn emit(&mut self, rows: usize) -> Batch {
        let frame = self.buffer.take_front(rows);
        let batch = Batch::new(self.next_index, self.emitted_rows, frame);
        self.next_index += 1;
        self.emitted_rows += rows;
        batch
    }

    fn fail(&mut self, error: DataSourceError) -> DataSourceError {
        self.finished = true;
        self.reader = None;
        self.buffer = Frame::empty(&self.columns);
        error
    }
}

impl Iterator for ParquetBatchSource {
    type Item = Result<Batch, DataSourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.buffer.num_rows() >= self.batch_size {
                return Some(Ok(self.emit(self.batch_size)));
            }
            let Some(reader) = self.reader.as_mut() else {
                if !self.buffer.is_empty() {
                    let rows = self.buffer.num_rows();
                    return Some(Ok(self.emit(rows)));
                }
                self.finished = true;
                if self.emitted_rows != self.total_rows {
                    let reason = format!(
                        "footer announced {} rows but {} were read",
                        self.total_rows, self.emitted_rows
                    );
                    return Some(Err(DataSourceError::Inconsistent(reason)));
                }
                return None;
            };
            match reader.next() {
                Some(Ok(record_batch)) => {
                    let appended = to_frame(&record_batch, &self.columns)
                        .and_then(|frame| self.buffer.append(frame).map_err(|e| e.to_string()));
                    if let Err(reason) = appended {
                        let error = DataSourceError::Read {
                            batch_index: self.next_index,
                            reason,
                        };
                        return Some(Err(self.fail(error)));
                    }
                }
                Some(Err(e)) => {
                    let error = DataSourceError::Read {
                        batch_index: self.next_index,
                        reason: e.to_string(),
                    };
                    return Some(Err(self.fail(error)));
                }
                None => self.reader = None,
            }
        }
    }
}

impl BatchSource for ParquetBatchSource {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn total_rows(&self) -> usize {
        self.total_rows
    }
}

impl std::fmt::Debug for ParquetBatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetBatchSource")
            .field("path", &self.path)
            .field("batch_size", &self.batch_size)
            .field("total_rows", &self.total_rows)
            .field("columns", &self.columns)
            .field("next_index", &self.next_index)
            .field("finished", &self.finished)
            .finish()
    }
}
