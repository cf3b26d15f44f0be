//! # Scoreflow
//!
//! Config-driven pipeline assembly and streaming parallel batch scoring.
//!
//! Scoreflow scores tabular datasets too large to hold in memory against a
//! pre-trained pipeline whose structure comes from a declarative document:
//!
//! - **Closed stage registry**: qualified names resolve only inside an
//!   allowlist of namespaces
//! - **Pipeline assembly**: a JSON5 document of `{name, params}` descriptors,
//!   including nested stages, becomes an immutable chain of transformers
//!   ending in a predictor
//! - **Streaming source**: Parquet datasets are read in fixed-size batches with
//!   memory bounded by the batch size
//! - **Parallel scoring**: batches run on a bounded worker pool and scores are
//!   released in dataset row order
//! - **Failure policies**: best-effort scoring isolates failed batches,
//!   fail-fast scoring cancels on the first failure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scoreflow::prelude::*;
//!
//! let registry = Arc::new(StageRegistry::from_config(&RegistryConfig::default())?);
//! let document = PipelineDocument::from_path("pipeline.json5")?;
//!
//! let job = ScoringJob::new(registry)
//!     .with_config(ScoringConfig::new().with_batch_size(1000).with_max_workers(4));
//! let collection = job.run_collect(&document, "readings.parquet").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod scorer;
pub mod source;
pub mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelReason, CancellationToken};
    pub use crate::core::{Batch, Column, Frame, Score, ScoreCollection, StageKind};
    pub use crate::errors::{
        ConfigurationError, DataSourceError, PipelineBuildError, ScoreflowError, ScoringFailedError,
        StageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, ScoringEvent};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        AssembledPipeline, FailurePolicy, PipelineAssembler, PipelineDocument, PipelineSpec,
        ScoreSummary, StageDescriptor,
    };
    pub use crate::registry::{RegistryConfig, StageRegistry};
    pub use crate::runner::ScoringJob;
    pub use crate::scorer::{CollectingSink, ParallelScorer, ResultSink, ScoringConfig};
    pub use crate::source::{BatchSource, FrameBatchSource, ParquetBatchSource, ParquetSourceOptions};
    pub use crate::stages::{Predictor, Stage, StageParams, Transformer};
    pub use std::sync::Arc;
}
