//! Integration tests for assembly, streaming and parallel scoring.

#[cfg(test)]
mod tests {
    use crate::core::{Column, Frame, Score};
    use crate::errors::{ConfigurationError, ScoreflowError};
    use crate::events::{CollectingEventSink, EventSink, ScoringEvent};
    use crate::pipeline::{
        AssembledPipeline, FailurePolicy, PipelineAssembler, PipelineDocument, PipelineSpec,
        StageDescriptor,
    };
    use crate::registry::{StageRegistry, DEFAULT_NAMESPACES};
    use crate::runner::ScoringJob;
    use crate::scorer::{ParallelScorer, ScoringConfig};
    use crate::stages::Transformer;
    use crate::source::{BatchSource, FrameBatchSource, ParquetBatchSource, ParquetSourceOptions};
    use crate::testing::{
        assert_all_scored, assert_failed_rows, assert_scores_follow_row_order, vibration_frame,
        write_vibration_parquet, ColumnPredictor, FailOnRows, VIBRATION_PIPELINE,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    /// Built-in stages plus `ns.Scaler` and `ns.Predictor` aliases.
    fn registry() -> Arc<StageRegistry> {
        let namespaces = DEFAULT_NAMESPACES.iter().copied().chain(["ns"]);
        let mut registry = StageRegistry::with_builtin_stages(namespaces);
        let scaler = registry.resolve("preprocessing.StandardScaler").unwrap();
        registry.register("ns.Scaler", move |params| scaler(params));
        let predictor = registry.resolve("linear_model.ThresholdClassifier").unwrap();
        registry.register("ns.Predictor", move |params| predictor(params));
        Arc::new(registry)
    }

    fn ids(rows: usize) -> Frame {
        Frame::new(vec![Column::new("id", (0..rows).map(|i| i as f64).collect())]).unwrap()
    }

    fn echo_pipeline_failing_at(rows: std::ops::Range<usize>) -> Arc<AssembledPipeline> {
        Arc::new(AssembledPipeline::new(
            vec![("test.FailOnRows".to_string(), Arc::new(FailOnRows::new(rows)) as Arc<dyn Transformer>)],
            ("test.ColumnPredictor".to_string(), Arc::new(ColumnPredictor::new("id"))),
        ))
    }

    fn example_spec() -> PipelineSpec {
        PipelineSpec::new(vec![
            StageDescriptor::new("ns.Scaler"),
            StageDescriptor::new("ns.Predictor").with_param("threshold", json!(0.5)),
        ])
    }

    #[test]
    fn test_built_pipeline_is_length_and_order_aligned() -> anyhow::Result<()> {
        let spec: PipelineDocument = r#"{
            steps: [
                { name: "feature_selection.SelectColumns", params: { columns: ["id"] } },
                { name: "preprocessing.MinMaxScaler", params: {} },
                { name: "linear_model.LinearRegression", params: { coef: [499.0] } },
            ],
        }"#
        .parse()?;
        let pipeline = PipelineAssembler::new(registry()).build_document(&spec)?;

        let predictions = pipeline.run(vibration_frame(500))?;
        assert_eq!(predictions.len(), 500);
        for (row, p) in predictions.iter().enumerate() {
            assert!((p - row as f64).abs() < 1e-9, "row {row} predicted {p}");
        }
        Ok(())
    }

    #[test]
    fn test_batch_counts_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        for (rows, batch_size) in [(1000, 250), (1001, 250), (7, 3), (5, 10), (1, 1)] {
            let path = write_vibration_parquet(dir.path(), rows, 128);
            let source = ParquetBatchSource::open(&path, batch_size, &ParquetSourceOptions::new()).unwrap();
            let sizes: Vec<usize> = source.map(|b| b.unwrap().len()).collect();

            assert_eq!(sizes.len(), rows.div_ceil(batch_size), "{rows} rows / {batch_size}");
            assert_eq!(sizes.iter().sum::<usize>(), rows);
            let (last, full) = sizes.split_last().unwrap();
            assert!(full.iter().all(|&s| s == batch_size));
            assert!(*last <= batch_size);

            let memory: Vec<usize> = FrameBatchSource::new(vibration_frame(rows), batch_size)
                .unwrap()
                .map(|b| b.unwrap().len())
                .collect();
            assert_eq!(memory, sizes);
        }
    }

    #[tokio::test]
    async fn test_scores_identical_across_worker_counts() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_vibration_parquet(dir.path(), 3000, 512);
        let document: PipelineDocument = VIBRATION_PIPELINE.parse().unwrap();

        let mut outputs = Vec::new();
        for max_workers in [1, 2, 8] {
            let job = ScoringJob::new(registry()).with_config(
                ScoringConfig::new()
                    .with_batch_size(128)
                    .with_max_workers(max_workers),
            );
            let collection = job.run_collect(&document, &dataset).await.unwrap();
            assert_all_scored(&collection, 3000);
            outputs.push(serde_json::to_vec(&collection.scores).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
    }

    #[tokio::test]
    async fn test_unknown_stages_fail_before_reading_data() {
        let job = ScoringJob::new(registry());
        let missing_dataset = "/no/such/dataset.parquet";
        let mut sink = crate::scorer::CollectingSink::new();

        for name in ["ns.NotRegistered", "subprocess.Popen", "os.system"] {
            let spec = PipelineSpec::new(vec![
                StageDescriptor::new(name),
                StageDescriptor::new("ns.Predictor").with_param("threshold", json!(0.5)),
            ]);
            let document = PipelineDocument { spec, model: None };
            let err = job.run(&document, missing_dataset, &mut sink).await.unwrap_err();
            assert!(
                matches!(err, ScoreflowError::Configuration(ConfigurationError::UnknownStage { position: 0, .. })),
                "{name}: {err}"
            );
        }

        // A predictor in a transformer position is a build error, also before any read.
        let spec = PipelineSpec::new(vec![
            StageDescriptor::new("ns.Predictor").with_param("threshold", json!(0.5)),
            StageDescriptor::new("ns.Predictor").with_param("threshold", json!(0.5)),
        ]);
        let err = job
            .run(&PipelineDocument { spec, model: None }, missing_dataset, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreflowError::PipelineBuild(ref e) if e.position == 0));
        assert!(sink.scores().is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_marks_exactly_one_batch() {
        let rows = 1000;
        let batch_size = 100;
        for k in [0, 4, 9] {
            let scorer = ParallelScorer::new(ScoringConfig::new().with_max_workers(4));
            let source = FrameBatchSource::new(ids(rows), batch_size).unwrap();
            let pipeline = echo_pipeline_failing_at(k * batch_size + 7..k * batch_size + 8);

            let collection = scorer.score(pipeline, source).await.unwrap();
            assert_eq!(collection.scores.len(), rows);
            assert_failed_rows(&collection, k * batch_size..(k + 1) * batch_size);
            assert_scores_follow_row_order(&collection.scores);
            assert_eq!(collection.summary.failed_batches, 1);
            assert_eq!(collection.summary.failures[0].batch_index, k);
            assert_eq!(collection.summary.completed_batches, 9);
        }
    }

    #[tokio::test]
    async fn test_fail_fast_cancels_undispatched_batches() {
        let k = 3;
        let predictor = Arc::new(ColumnPredictor::new("id"));
        let pipeline = Arc::new(AssembledPipeline::new(
            vec![("test.FailOnRows".to_string(), Arc::new(FailOnRows::new(k * 10..k * 10 + 1)) as Arc<dyn Transformer>)],
            ("test.ColumnPredictor".to_string(), Arc::clone(&predictor) as _),
        ));
        let scorer = ParallelScorer::new(
            ScoringConfig::new()
                .with_max_workers(1)
                .with_failure_policy(FailurePolicy::FailFast),
        );
        let source = FrameBatchSource::new(ids(200), 10).unwrap();

        let err = scorer.score(pipeline, source).await.unwrap_err();
        let ScoreflowError::ScoringFailed(failed) = err else {
            panic!("expected ScoringFailed, got {err}");
        };
        assert_eq!(failed.failed_batch, k);
        assert_eq!(failed.completed_batches, k);
        assert_eq!(failed.released_rows, k * 10);
        assert_eq!(failed.source.offset, k * 10);
        // Batches after k were never scored.
        assert_eq!(predictor.call_count(), k);
    }

    #[tokio::test]
    async fn test_fail_fast_with_parallel_workers_stops_early() {
        let scorer = ParallelScorer::new(
            ScoringConfig::new()
                .with_max_workers(4)
                .with_failure_policy(FailurePolicy::FailFast),
        );
        let source = FrameBatchSource::new(ids(10_000), 10).unwrap();

        let err = scorer
            .score(echo_pipeline_failing_at(20..21), source)
            .await
            .unwrap_err();
        let ScoreflowError::ScoringFailed(failed) = err else {
            panic!("expected ScoringFailed, got {err}");
        };
        assert_eq!(failed.failed_batch, 2);
        assert!(failed.completed_batches < 1000);
        assert!(failed.released_rows <= 20);
    }

    #[test]
    fn test_example_scaler_predictor_over_1000_rows() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_vibration_parquet(dir.path(), 1000, 300);
        let options = ParquetSourceOptions::new().with_columns(["vibration_y"]);
        let pipeline = Arc::new(PipelineAssembler::new(registry()).build(&example_spec()).unwrap());

        let source = ParquetBatchSource::open(&dataset, 250, &options).unwrap();
        assert_eq!(source.expected_batches(), 4);

        let events = Arc::new(CollectingEventSink::new());
        let scorer = ParallelScorer::new(ScoringConfig::new().with_max_workers(4))
            .with_event_sink(Arc::clone(&events) as Arc<dyn EventSink>);
        let collection = tokio_test::block_on(scorer.score(Arc::clone(&pipeline), source)).unwrap();
        assert_eq!(collection.scores.len(), 1000);
        assert_eq!(collection.summary.completed_batches, 4);

        // Scoring batch by batch on one thread gives the same sequence.
        let sequential: Vec<Score> = ParquetBatchSource::open(&dataset, 250, &options)
            .unwrap()
            .flat_map(|b| pipeline.run(b.unwrap().frame).unwrap())
            .map(Score::Value)
            .collect();
        assert_eq!(collection.scores, sequential);

        let recorded = events.events();
        assert!(matches!(recorded.first(), Some(ScoringEvent::Started { expected_batches: 4, .. })));
        assert!(matches!(recorded.last(), Some(ScoringEvent::Completed { total_rows: 1000, .. })));
        assert_eq!(events.events_of_type("batch.completed").len(), 4);
    }

    #[tokio::test]
    async fn test_short_final_batch_scored_like_others() {
        let scorer = ParallelScorer::new(ScoringConfig::new().with_max_workers(2));
        let source = FrameBatchSource::new(ids(1003), 250).unwrap();

        let collection = scorer
            .score(echo_pipeline_failing_at(usize::MAX - 1..usize::MAX), source)
            .await
            .unwrap();
        assert_all_scored(&collection, 1003);
        assert_scores_follow_row_order(&collection.scores);
        assert_eq!(collection.summary.completed_batches, 5);
    }

    #[tokio::test]
    async fn test_nested_document_scores_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_vibration_parquet(dir.path(), 600, 200);
        let document: PipelineDocument = r#"{
            steps: [
                { name: "preprocessing.SimpleImputer", params: { strategy: "median" } },
                {
                    name: "compose.FeatureUnion",
                    params: {
                        transformer_list: [
                            { name: "preprocessing.StandardScaler", params: {} },
                            { name: "preprocessing.MinMaxScaler", params: {} },
                        ],
                    },
                },
                {
                    name: "ensemble.VotingClassifier",
                    params: {
                        estimators: [
                            { name: "linear_model.ThresholdClassifier", params: { threshold: 0.0 } },
                            { name: "linear_model.LogisticRegression", params: { coef: [1, 1, 1, 1, 1, 1] } },
                        ],
                    },
                },
            ],
        }"#
        .parse()
        .unwrap();
        let job = ScoringJob::new(registry())
            .with_config(ScoringConfig::new().with_batch_size(64).with_max_workers(3))
            .with_source_options(ParquetSourceOptions::new().with_columns(["vibration_x", "vibration_y", "vibration_z"]));

        let collection = job.run_collect(&document, &dataset).await.unwrap();
        assert_all_scored(&collection, 600);
        assert_eq!(collection.summary.total_batches, 10);
    }
}
