//! Core domain model types for scoreflow.
//!
//! This module contains the data passed through a scoring run:
//! - Column-major numeric frames
//! - Batches of frames tagged with their position in the dataset
//! - Per-row scores and the ordered score collection
//! - Stage kind and batch status enums

mod batch;
mod frame;
mod score;
mod status;

pub use batch::Batch;
pub use frame::{Column, Frame};
pub use score::{Score, ScoreCollection};
pub use status::{BatchStatus, StageKind};
