//! Datasets and pipeline documents for tests and benchmarks.
//!
//! Fixture helpers panic on I/O failure: they only run inside tests.

use crate::core::{Column, Frame};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Feature columns of the vibration fixture.
pub const VIBRATION_FEATURES: [&str; 3] = ["vibration_x", "vibration_y", "vibration_z"];

/// A JSON5 pipeline document over the vibration features.
pub const VIBRATION_PIPELINE: &str = r#"{
    // scale, then flag rows whose mean scaled vibration is high
    steps: [
        { name: "feature_selection.SelectColumns", params: { columns: ["vibration_x", "vibration_y", "vibration_z"] } },
        { name: "preprocessing.SimpleImputer", params: { strategy: "mean" } },
        { name: "preprocessing.StandardScaler", params: {} },
        {
            name: "linear_model.LogisticRegression",
            params: { coef: [1.0, 1.0, 1.0], intercept: 0.0 },
        },
    ],
}"#;

/// Deterministic vibration reading for row `i`; every 97th x reading is missing.
fn reading(i: usize, axis: usize) -> Option<f64> {
    if axis == 0 && i % 97 == 96 {
        return None;
    }
    let t = i as f64;
    Some(((axis + 1) as f64).mul_add((t * 0.01).sin(), t.mul_add(0.001, axis as f64)))
}

/// A frame with an `id` column and the three vibration features.
#[must_use]
pub fn vibration_frame(rows: usize) -> Frame {
    let mut columns = vec![Column::new("id", (0..rows).map(|i| i as f64).collect())];
    for (axis, name) in VIBRATION_FEATURES.iter().enumerate() {
        let values = (0..rows)
            .map(|i| reading(i, axis).unwrap_or(f64::NAN))
            .collect();
        columns.push(Column::new(*name, values));
    }
    Frame::with_rows(rows, columns).unwrap_or_else(|e| panic!("invalid fixture frame: {e}"))
}

/// Writes record batches to `dir/name`, closing a row group every
/// `row_group_size` rows when given.
pub fn write_parquet(
    dir: &Path,
    name: &str,
    schema: SchemaRef,
    batches: &[RecordBatch],
    row_group_size: Option<usize>,
) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap_or_else(|e| panic!("cannot create {}: {e}", path.display()));
    let mut writer =
        ArrowWriter::try_new(file, schema, None).unwrap_or_else(|e| panic!("cannot start writer: {e}"));
    for batch in batches {
        let step = row_group_size.unwrap_or(batch.num_rows()).max(1);
        let mut start = 0;
        while start < batch.num_rows() {
            let len = step.min(batch.num_rows() - start);
            writer
                .write(&batch.slice(start, len))
                .unwrap_or_else(|e| panic!("cannot write batch: {e}"));
            if row_group_size.is_some() {
                writer.flush().unwrap_or_else(|e| panic!("cannot flush row group: {e}"));
            }
            start += len;
        }
    }
    writer.close().unwrap_or_else(|e| panic!("cannot close writer: {e}"));
    path
}

/// Writes `rows` rows of the vibration fixture to `dir/vibration.parquet`.
///
/// Columns are `id` followed by the vibration features; missing readings are
/// stored as nulls.
pub fn write_vibration_parquet(dir: &Path, rows: usize, row_group_size: usize) -> PathBuf {
    let mut fields = vec![Field::new("id", DataType::Float64, false)];
    fields.extend(
        VIBRATION_FEATURES
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Float64Array::from_iter_values(
        (0..rows).map(|i| i as f64),
    ))];
    for axis in 0..VIBRATION_FEATURES.len() {
        arrays.push(Arc::new(
            (0..rows).map(|i| reading(i, axis)).collect::<Float64Array>(),
        ));
    }
    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)
        .unwrap_or_else(|e| panic!("invalid fixture batch: {e}"));
    write_parquet(dir, "vibration.parquet", schema, &[batch], Some(row_group_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineDocument;

    #[test]
    fn test_vibration_frame_shape() {
        let frame = vibration_frame(200);
        assert_eq!(frame.num_rows(), 200);
        assert_eq!(
            frame.column_names(),
            vec!["id", "vibration_x", "vibration_y", "vibration_z"]
        );
        assert!(frame.column("vibration_x").unwrap().values[96].is_nan());
        assert!(!frame.column("vibration_y").unwrap().values[96].is_nan());
    }

    #[test]
    fn test_vibration_pipeline_parses() {
        let document: PipelineDocument = VIBRATION_PIPELINE.parse().unwrap();
        assert_eq!(document.spec.len(), 4);
        assert!(document.model.is_none());
    }

    #[test]
    fn test_write_vibration_parquet_row_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_vibration_parquet(dir.path(), 25, 10);
        let file = File::open(path).unwrap();
        let builder =
            parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 3);
        assert_eq!(builder.metadata().file_metadata().num_rows(), 25);
    }
}
