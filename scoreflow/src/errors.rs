//! Error types for the scoreflow engine.
//!
//! Configuration and build errors are fatal and surface before any data is
//! read. Data source errors are fatal. Batch scoring errors are isolated to
//! their batch under best-effort scoring and fatal under fail-fast scoring.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for scoreflow operations.
#[derive(Debug, Error)]
pub enum ScoreflowError {
    /// Invalid configuration (unknown stage, malformed descriptor, bad batch size).
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The pipeline could not be assembled.
    #[error("{0}")]
    PipelineBuild(#[from] PipelineBuildError),

    /// The dataset could not be opened or read.
    #[error("{0}")]
    DataSource(#[from] DataSourceError),

    /// A fail-fast scoring run was cancelled by a batch failure.
    #[error("{0}")]
    ScoringFailed(#[from] ScoringFailedError),

    /// The result sink rejected scores.
    #[error("{0}")]
    Sink(#[from] SinkError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoreflowError {
    /// Returns true for errors that are raised before any data is read.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::PipelineBuild(_))
    }
}

/// Diagnostic metadata attached to build errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "BUILD-002-MISPLACED_PREDICTOR").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Why a qualified stage name could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownStageReason {
    /// The namespace is not in the allowlist.
    Disallowed {
        /// The namespace of the rejected name.
        namespace: String,
    },
    /// The namespace is allowed but nothing is registered under the name.
    NotRegistered,
}

/// Error raised by the registry when a name cannot be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", describe_unknown(.name, .reason))]
pub struct UnknownStageError {
    /// The qualified name that failed to resolve.
    pub name: String,
    /// The reason resolution failed.
    pub reason: UnknownStageReason,
}

fn describe_unknown(name: &str, reason: &UnknownStageReason) -> String {
    match reason {
        UnknownStageReason::Disallowed { namespace } => {
            format!("Stage '{name}' is outside the allowed namespaces (namespace '{namespace}')")
        }
        UnknownStageReason::NotRegistered => format!("Stage '{name}' is not registered"),
    }
}

impl UnknownStageError {
    /// Creates an error for a name outside the allowlist.
    #[must_use]
    pub fn disallowed(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: UnknownStageReason::Disallowed {
                namespace: namespace.into(),
            },
        }
    }

    /// Creates an error for a name that is not registered.
    #[must_use]
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: UnknownStageReason::NotRegistered,
        }
    }
}

/// Configuration errors. Always fatal, surfaced before any data is read.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// A stage name is unknown or outside the allowlist.
    #[error("Unknown stage at {path}: {source}")]
    UnknownStage {
        /// Top-level step position.
        position: usize,
        /// Location of the descriptor, e.g. `steps[1].transformer_list[0]`.
        path: String,
        /// The resolution failure.
        #[source]
        source: UnknownStageError,
    },

    /// A stage descriptor is malformed.
    #[error("Malformed stage descriptor at {path}: {reason}")]
    MalformedDescriptor {
        /// Location of the descriptor.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The pipeline document could not be parsed.
    #[error("Malformed pipeline document: {0}")]
    MalformedDocument(String),

    /// The pipeline document could not be read.
    #[error("Cannot read pipeline document {path}: {reason}")]
    UnreadableDocument {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error message.
        reason: String,
    },

    /// The batch size is not a positive integer.
    #[error("Invalid batch size {0}: batch size must be a positive integer")]
    InvalidBatchSize(usize),

    /// The worker count is not a positive integer.
    #[error("Invalid worker count {0}: max_workers must be a positive integer")]
    InvalidWorkerCount(usize),

    /// The document references a model artifact that was not injected.
    #[error("Unknown model artifact '{0}'")]
    UnknownModel(String),

    /// A namespace in the allowlist is not a valid identifier path.
    #[error("Invalid allowed namespace '{0}'")]
    InvalidNamespace(String),
}

/// Error raised when the pipeline cannot be assembled.
#[derive(Debug, Clone, Error)]
#[error("Failed to build pipeline at {path} ('{name}'): {message}")]
pub struct PipelineBuildError {
    /// Top-level step position (or the step count for pipeline-level errors).
    pub position: usize,
    /// Location of the failing descriptor.
    pub path: String,
    /// Qualified name of the failing stage.
    pub name: String,
    /// What went wrong.
    pub message: String,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl PipelineBuildError {
    /// Creates a new build error.
    #[must_use]
    pub fn new(
        position: usize,
        path: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            position,
            path: path.into(),
            name: name.into(),
            message: message.into(),
            error_info: None,
        }
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised by a single stage, at construction or while processing a frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// A construction parameter is missing, unknown or has the wrong type.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// A column required by the stage is absent from the frame.
    #[error("Missing column '{0}'")]
    MissingColumn(String),

    /// Frame width does not match what the stage was configured for.
    #[error("Expected {expected} columns, got {actual}")]
    ColumnCountMismatch {
        /// Configured width.
        expected: usize,
        /// Observed width.
        actual: usize,
    },

    /// A stage produced a different number of rows than it received.
    #[error("Stage produced {actual} rows for {expected} input rows")]
    LengthMismatch {
        /// Input row count.
        expected: usize,
        /// Output row count.
        actual: usize,
    },

    /// Frame construction failed.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The stage panicked.
    #[error("Stage panicked: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl StageError {
    /// Creates a generic failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an invalid-parameters error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }
}

/// Error raised when running an assembled pipeline on one frame.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Stage {position} ('{stage}') failed: {source}")]
pub struct PipelineRunError {
    /// Position of the failing stage in the chain.
    pub position: usize,
    /// Name of the failing stage.
    pub stage: String,
    /// The stage error.
    #[source]
    pub source: StageError,
}

/// Error raised when one batch fails to score.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Batch {batch_index} (rows {offset}..{}) failed: {source}", .offset + .rows)]
pub struct BatchScoringError {
    /// Index of the batch in the source enumeration.
    pub batch_index: usize,
    /// First row of the batch.
    pub offset: usize,
    /// Number of rows in the batch.
    pub rows: usize,
    /// The pipeline failure.
    #[source]
    pub source: PipelineRunError,
}

/// Error raised when a fail-fast run is cancelled by a batch failure.
#[derive(Debug, Clone, Error)]
#[error(
    "Scoring failed at batch {failed_batch} ({completed_batches} batches completed, {released_rows} rows released): {source}"
)]
pub struct ScoringFailedError {
    /// Index of the batch whose failure cancelled the run.
    pub failed_batch: usize,
    /// Number of batches that completed successfully, including those that
    /// finished while in-flight work drained after cancellation.
    pub completed_batches: usize,
    /// Number of rows whose scores were released in order before cancellation.
    pub released_rows: usize,
    /// The triggering failure.
    #[source]
    pub source: BatchScoringError,
}

/// Errors raised by the batch source.
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    /// The file could not be opened or its metadata is invalid.
    #[error("Cannot open dataset {path}: {reason}")]
    Open {
        /// Dataset path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A requested column does not exist.
    #[error("Column '{column}' not found in dataset {path}")]
    MissingColumn {
        /// Dataset path.
        path: PathBuf,
        /// Requested column.
        column: String,
    },

    /// A requested column is not numeric.
    #[error("Column '{column}' in dataset {path} has non-numeric type {data_type}")]
    UnsupportedColumn {
        /// Dataset path.
        path: PathBuf,
        /// Requested column.
        column: String,
        /// The Arrow data type.
        data_type: String,
    },

    /// Reading a batch failed.
    #[error("Failed to read batch {batch_index}: {reason}")]
    Read {
        /// Index of the batch being read.
        batch_index: usize,
        /// What went wrong.
        reason: String,
    },

    /// The source produced fewer or more rows than its metadata announced,
    /// or batches that are not contiguous.
    #[error("Dataset is inconsistent: {0}")]
    Inconsistent(String),
}

/// Error raised by a result sink.
#[derive(Debug, Clone, Error)]
#[error("Result sink failed at row {offset}: {reason}")]
pub struct SinkError {
    /// First row of the rejected chunk.
    pub offset: usize,
    /// What went wrong.
    pub reason: String,
}

impl SinkError {
    /// Creates a new sink error.
    #[must_use]
    pub fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}
