//! End-to-end scoring jobs: pipeline document in, ordered scores out.

use crate::core::ScoreCollection;
use crate::errors::ScoreflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{AssembledPipeline, PipelineAssembler, PipelineDocument, ScoreSummary};
use crate::registry::StageRegistry;
use crate::scorer::{CollectingSink, ParallelScorer, ResultSink, ScoringConfig};
use crate::source::{BatchSource, ParquetBatchSource, ParquetSourceOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Wires a pipeline document, a Parquet dataset and a result sink together.
///
/// Every configuration problem (scoring parameters, pipeline document,
/// dataset columns) is reported before any batch is scored.
#[derive(Clone)]
pub struct ScoringJob {
    assembler: PipelineAssembler,
    config: ScoringConfig,
    source_options: ParquetSourceOptions,
    event_sink: Arc<dyn EventSink>,
}

impl ScoringJob {
    /// Creates a job resolving stages from `registry`, with default settings.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self {
            assembler: PipelineAssembler::new(registry),
            config: ScoringConfig::default(),
            source_options: ParquetSourceOptions::default(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the scoring configuration.
    #[must_use]
    pub fn with_config(mut self, config: ScoringConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the dataset read options.
    #[must_use]
    pub fn with_source_options(mut self, options: ParquetSourceOptions) -> Self {
        self.source_options = options;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The scoring configuration.
    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Assembles the document's pipeline without reading any data.
    pub fn assemble(&self, document: &PipelineDocument) -> Result<AssembledPipeline, ScoreflowError> {
        self.config.validate()?;
        self.assembler.build_document(document)
    }

    /// Scores `dataset`, streaming ordered chunks into `sink`.
    pub async fn run(
        &self,
        document: &PipelineDocument,
        dataset: impl AsRef<Path>,
        sink: &mut dyn ResultSink,
    ) -> Result<ScoreSummary, ScoreflowError> {
        let pipeline = Arc::new(self.assemble(document)?);
        let source = ParquetBatchSource::open(dataset.as_ref(), self.config.batch_size, &self.source_options)?;
        info!(
            dataset = %dataset.as_ref().display(),
            total_rows = source.total_rows(),
            columns = ?source.columns(),
            stages = pipeline.len(),
            "Starting scoring job"
        );
        self.scorer().score_into(pipeline, source, sink).await
    }

    /// Scores `dataset` and returns every score in memory.
    pub async fn run_collect(
        &self,
        document: &PipelineDocument,
        dataset: impl AsRef<Path>,
    ) -> Result<ScoreCollection, ScoreflowError> {
        let mut sink = CollectingSink::new();
        let summary = self.run(document, dataset, &mut sink).await?;
        Ok(ScoreCollection {
            scores: sink.into_scores(),
            summary,
        })
    }

    /// Loads the pipeline document from `pipeline_path`, then runs as
    /// [`ScoringJob::run`].
    pub async fn run_files(
        &self,
        pipeline_path: impl AsRef<Path>,
        dataset: impl AsRef<Path>,
        sink: &mut dyn ResultSink,
    ) -> Result<ScoreSummary, ScoreflowError> {
        let document = PipelineDocument::from_path(pipeline_path)?;
        self.run(&document, dataset, sink).await
    }

    fn scorer(&self) -> ParallelScorer {
        ParallelScorer::new(self.config.clone()).with_event_sink(Arc::clone(&self.event_sink))
    }
}

impl std::fmt::Debug for ScoringJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringJob")
            .field("config", &self.config)
            .field("source_options", &self.source_options)
            .finish_non_exhaustive()
    }
}
