//! Parallel, order-preserving batch scoring.
//!
//! One blocking producer task reads the batch source and hands batches over a
//! bounded channel to the coordinator. The coordinator keeps at most
//! `max_workers` blocking worker tasks in flight, feeds their results through
//! a [`ReorderBuffer`] and releases scores to a [`ResultSink`] in dataset row
//! order. With `max_workers` in flight and a channel of the same capacity, at
//! most `2 * max_workers` batches plus the reorder backlog are resident.

mod reorder;
mod sink;

pub use reorder::{ReleasedChunk, ReorderBuffer};
pub use sink::{CollectingSink, CountingSink, ResultSink};

use crate::cancellation::{CancelReason, CancellationToken};
use crate::core::{Batch, BatchStatus, Score, ScoreCollection};
use crate::errors::{
    BatchScoringError, ConfigurationError, DataSourceError, PipelineRunError, ScoreflowError,
    ScoringFailedError,
};
use crate::events::{EventSink, NoOpEventSink, ScoringEvent};
use crate::observability::SpanTimer;
use crate::pipeline::{AssembledPipeline, FailureCollector, FailurePolicy, ScoreSummary};
use crate::source::BatchSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

fn default_batch_size() -> usize {
    1000
}

fn default_max_workers() -> usize {
    4
}

fn default_cancel_grace_ms() -> u64 {
    5000
}

/// Scoring parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Rows per batch when the scorer opens the source itself.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum batches scored concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// What to do when a batch fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// How long a cancelled run waits for in-flight batches.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            failure_policy: FailurePolicy::default(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl ScoringConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the cancellation grace period.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Rejects zero batch sizes and worker counts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBatchSize` or `InvalidWorkerCount`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        crate::source::check_batch_size(self.batch_size)?;
        if self.max_workers == 0 {
            return Err(ConfigurationError::InvalidWorkerCount(self.max_workers));
        }
        Ok(())
    }
}

/// Result of one worker task.
struct BatchOutcome {
    index: usize,
    offset: usize,
    rows: usize,
    result: Option<Result<Vec<f64>, PipelineRunError>>,
}

impl BatchOutcome {
    fn status(&self) -> BatchStatus {
        match &self.result {
            Some(Ok(_)) => BatchStatus::Scored,
            Some(Err(_)) => BatchStatus::Failed,
            None => BatchStatus::Cancelled,
        }
    }
}

/// Why the coordinator stopped dispatching early.
enum Halt {
    BatchFailed(BatchScoringError),
    SourceFailed(DataSourceError),
    Fatal(ScoreflowError),
}

/// Per-run mutable state owned by the coordinator.
struct RunState<'a> {
    run_id: Uuid,
    policy: FailurePolicy,
    events: &'a dyn EventSink,
    sink: &'a mut dyn ResultSink,
    reorder: ReorderBuffer,
    collector: FailureCollector,
}

impl RunState<'_> {
    /// Books a finished batch. Returns the failure if it must stop the run.
    async fn accept(&mut self, outcome: BatchOutcome) -> Result<(), Halt> {
        let status = outcome.status();
        let BatchOutcome {
            index,
            offset,
            rows,
            result,
        } = outcome;
        debug!(batch_index = index, rows, %status, "Batch finished");
        match result {
            None => Ok(()),
            Some(Ok(predictions)) => {
                self.collector.record_completion(rows);
                let scores = predictions.into_iter().map(Score::Value).collect();
                self.reorder
                    .insert(index, offset, scores)
                    .map_err(|e| Halt::Fatal(e.into()))?;
                self.events
                    .emit(&ScoringEvent::BatchCompleted {
                        run_id: self.run_id,
                        batch_index: index,
                        rows,
                    })
                    .await;
                Ok(())
            }
            Some(Err(source)) => {
                let error = BatchScoringError {
                    batch_index: index,
                    offset,
                    rows,
                    source,
                };
                self.collector.record_failure(&error);
                self.events
                    .emit(&ScoringEvent::BatchFailed {
                        run_id: self.run_id,
                        batch_index: index,
                        offset,
                        rows,
                        stage: error.source.stage.clone(),
                        error: error.source.source.to_string(),
                    })
                    .await;
                match self.policy {
                    FailurePolicy::BestEffort => {
                        warn!(
                            batch_index = index,
                            offset,
                            rows,
                            stage = %error.source.stage,
                            error = %error.source.source,
                            "Batch failed; rows marked as failed"
                        );
                        self.reorder
                            .insert(index, offset, vec![Score::Failed; rows])
                            .map_err(|e| Halt::Fatal(e.into()))
                    }
                    FailurePolicy::FailFast => Err(Halt::BatchFailed(error)),
                }
            }
        }
    }

    /// Hands every releasable chunk to the sink, in order.
    fn release(&mut self) -> Result<(), ScoreflowError> {
        while let Some(chunk) = self.reorder.pop_ready()? {
            self.sink.accept(chunk.offset, &chunk.scores)?;
        }
        Ok(())
    }
}

/// Scores batches from a [`BatchSource`] against an [`AssembledPipeline`].
#[derive(Clone)]
pub struct ParallelScorer {
    config: ScoringConfig,
    event_sink: Arc<dyn EventSink>,
}

impl ParallelScorer {
    /// Creates a scorer with the given configuration and no event sink.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The scorer configuration.
    #[must_use]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scores every row and returns the scores in dataset row order.
    ///
    /// # Errors
    ///
    /// See [`ParallelScorer::score_into`].
    pub async fn score<S>(
        &self,
        pipeline: Arc<AssembledPipeline>,
        source: S,
    ) -> Result<ScoreCollection, ScoreflowError>
    where
        S: BatchSource + 'static,
    {
        let mut sink = CollectingSink::with_capacity(source.total_rows());
        let summary = self.score_into(pipeline, source, &mut sink).await?;
        Ok(ScoreCollection {
            scores: sink.into_scores(),
            summary,
        })
    }

    /// Scores every row, streaming ordered chunks into `sink`.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the worker count is zero.
    /// - `DataSource` if the source fails or yields rows inconsistent with
    ///   its announced total.
    /// - `ScoringFailed` for the first batch failure under fail-fast.
    /// - `Sink` if the sink rejects a chunk.
    pub async fn score_into<S>(
        &self,
        pipeline: Arc<AssembledPipeline>,
        source: S,
        sink: &mut dyn ResultSink,
    ) -> Result<ScoreSummary, ScoreflowError>
    where
        S: BatchSource + 'static,
    {
        if self.config.max_workers == 0 {
            return Err(ConfigurationError::InvalidWorkerCount(0).into());
        }
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("score", %run_id, max_workers = self.config.max_workers);
        self.run(run_id, started_at, pipeline, source, sink)
            .instrument(span)
            .await
    }

    async fn run<S>(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        pipeline: Arc<AssembledPipeline>,
        source: S,
        sink: &mut dyn ResultSink,
    ) -> Result<ScoreSummary, ScoreflowError>
    where
        S: BatchSource + 'static,
    {
        let timer = SpanTimer::start("score");
        let max_workers = self.config.max_workers;
        let policy = self.config.failure_policy;
        let total_rows = source.total_rows();
        let expected_batches = source.expected_batches();

        info!(
            total_rows,
            expected_batches,
            batch_size = source.batch_size(),
            ?policy,
            stages = ?pipeline.stage_names(),
            "Scoring started"
        );
        self.event_sink
            .emit(&ScoringEvent::Started {
                run_id,
                total_rows,
                expected_batches,
                batch_size: source.batch_size(),
                max_workers,
                policy,
            })
            .await;

        let token = Arc::new(CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(max_workers);
        let producer = spawn_producer(source, tx, Arc::clone(&token));

        let mut state = RunState {
            run_id,
            policy,
            events: self.event_sink.as_ref(),
            sink,
            reorder: ReorderBuffer::new(),
            collector: FailureCollector::new(policy, run_id, started_at),
        };
        let mut workers: JoinSet<BatchOutcome> = JoinSet::new();
        let mut source_done = false;

        let halt = loop {
            if source_done && workers.is_empty() {
                break None;
            }
            tokio::select! {
                received = rx.recv(), if !source_done && workers.len() < max_workers => {
                    match received {
                        Some(Ok(batch)) => spawn_worker(&mut workers, &pipeline, &token, batch),
                        Some(Err(e)) => break Some(Halt::SourceFailed(e)),
                        None => source_done = true,
                    }
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => break Some(Halt::Fatal(worker_crashed(&e))),
                    };
                    if let Err(halt) = state.accept(outcome).await {
                        break Some(halt);
                    }
                    if let Err(e) = state.release() {
                        break Some(Halt::Fatal(e));
                    }
                }
                else => break None,
            }
        };

        // The producer exits once the receiver is gone, even if the channel is full.
        drop(rx);
        let result = match halt {
            None => {
                join_producer(producer).await;
                Self::check_complete(&state, total_rows)
                    .and_then(|()| state.sink.finish().map_err(ScoreflowError::from))
            }
            Some(halt) => {
                let error = self.shut_down(&token, &mut workers, &mut state, halt).await;
                join_producer(producer).await;
                Err(error)
            }
        };

        let duration_ms = timer.elapsed_ms();
        match result {
            Ok(()) => {
                let summary = state.collector.finish(duration_ms);
                info!(
                    completed_batches = summary.completed_batches,
                    failed_batches = summary.failed_batches,
                    total_rows = summary.total_rows,
                    duration_ms,
                    "Scoring completed"
                );
                self.event_sink
                    .emit(&ScoringEvent::Completed {
                        run_id,
                        completed_batches: summary.completed_batches,
                        failed_batches: summary.failed_batches,
                        total_rows: summary.total_rows,
                        duration_ms,
                    })
                    .await;
                Ok(summary)
            }
            Err(error) => {
                let reason = token
                    .reason()
                    .map_or_else(|| error.to_string(), |r| r.to_string());
                warn!(%reason, duration_ms, error = %error, "Scoring cancelled");
                self.event_sink
                    .emit(&ScoringEvent::Cancelled { run_id, reason })
                    .await;
                Err(error)
            }
        }
    }

    /// Cancels the run, waits up to the grace period for in-flight batches and
    /// returns the error to report.
    ///
    /// After a source failure the in-flight batches all precede the failed
    /// read, so they run to completion and cancellation follows the drain.
    async fn shut_down(
        &self,
        token: &CancellationToken,
        workers: &mut JoinSet<BatchOutcome>,
        state: &mut RunState<'_>,
        halt: Halt,
    ) -> ScoreflowError {
        let (failed_batch, mut release_allowed) = match &halt {
            Halt::BatchFailed(error) => {
                token.cancel(CancelReason::BatchFailed {
                    batch_index: error.batch_index,
                });
                (Some(error.batch_index), true)
            }
            Halt::SourceFailed(_) => (None, true),
            Halt::Fatal(ScoreflowError::Sink(e)) => {
                token.cancel(CancelReason::SinkFailed { offset: e.offset });
                (None, false)
            }
            Halt::Fatal(e) => {
                token.cancel(CancelReason::Requested(e.to_string()));
                (None, true)
            }
        };
        debug!(in_flight = workers.len(), ?failed_batch, "Draining in-flight batches");

        let grace = self.config.cancel_grace();
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = workers.join_next().await {
                let Ok(outcome) = joined else { continue };
                // Later failures are recorded by `accept`; the first one is reported.
                let _ = state.accept(outcome).await;
                if release_allowed {
                    if let Err(e) = state.release() {
                        warn!(error = %e, "Result sink failed while draining");
                        release_allowed = false;
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_ms = self.config.cancel_grace_ms,
                abandoned = workers.len(),
                "Grace period elapsed; abandoning in-flight batches"
            );
            workers.abort_all();
        }
        if matches!(halt, Halt::SourceFailed(_)) {
            token.cancel(CancelReason::SourceFailed);
        }

        match halt {
            Halt::BatchFailed(source) => ScoringFailedError {
                failed_batch: source.batch_index,
                completed_batches: state.collector.completed_batches(),
                released_rows: state.reorder.released_rows(),
                source,
            }
            .into(),
            Halt::SourceFailed(error) => error.into(),
            Halt::Fatal(error) => error,
        }
    }

    fn check_complete(state: &RunState<'_>, total_rows: usize) -> Result<(), ScoreflowError> {
        let released = state.reorder.released_rows();
        if state.reorder.pending_len() > 0 || released != total_rows {
            return Err(DataSourceError::Inconsistent(format!(
                "source announced {total_rows} rows but {released} were scored"
            ))
            .into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ParallelScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelScorer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn spawn_producer<S>(
    mut source: S,
    tx: mpsc::Sender<Result<Batch, DataSourceError>>,
    token: Arc<CancellationToken>,
) -> JoinHandle<()>
where
    S: BatchSource + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let mut produced = 0usize;
        while !token.is_cancelled() {
            let Some(item) = source.next() else { break };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
            produced += 1;
        }
        debug!(produced, cancelled = token.is_cancelled(), "Batch producer finished");
    })
}

async fn join_producer(producer: JoinHandle<()>) {
    if let Err(e) = producer.await {
        warn!(error = %e, "Batch producer task failed");
    }
}

fn spawn_worker(
    workers: &mut JoinSet<BatchOutcome>,
    pipeline: &Arc<AssembledPipeline>,
    token: &Arc<CancellationToken>,
    batch: Batch,
) {
    let pipeline = Arc::clone(pipeline);
    let token = Arc::clone(token);
    let span = Span::current();
    workers.spawn_blocking(move || {
        let _entered = span.enter();
        let (index, offset, rows) = (batch.index, batch.offset, batch.len());
        let result = if token.is_cancelled() {
            None
        } else {
            Some(pipeline.run(batch.frame))
        };
        BatchOutcome {
            index,
            offset,
            rows,
            result,
        }
    });
}

fn worker_crashed(error: &JoinError) -> ScoreflowError {
    ScoreflowError::Internal(format!("scoring worker task failed: {error}"))
}
