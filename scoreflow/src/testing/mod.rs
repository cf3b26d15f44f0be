//! Testing utilities for scoreflow.
//!
//! This module provides:
//! - Parquet and in-memory dataset fixtures
//! - Mock stages that fail, panic or stall on chosen rows
//! - Assertions over score collections

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_all_scored, assert_failed_rows, assert_scores_follow_row_order};
pub use fixtures::{
    vibration_frame, write_parquet, write_vibration_parquet, VIBRATION_FEATURES, VIBRATION_PIPELINE,
};
pub use mocks::{ColumnPredictor, FailOnRows, SlowStage};
