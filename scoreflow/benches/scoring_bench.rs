//! Benchmarks for pipeline assembly and parallel scoring.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scoreflow::pipeline::{PipelineAssembler, PipelineDocument};
use scoreflow::registry::{StageRegistry, DEFAULT_NAMESPACES};
use scoreflow::scorer::{CountingSink, ParallelScorer, ScoringConfig};
use scoreflow::source::FrameBatchSource;
use scoreflow::testing::{vibration_frame, VIBRATION_PIPELINE};
use std::sync::Arc;

fn assembler() -> PipelineAssembler {
    PipelineAssembler::new(Arc::new(StageRegistry::with_builtin_stages(
        DEFAULT_NAMESPACES.iter().copied(),
    )))
}

fn assembly_benchmark(c: &mut Criterion) {
    let assembler = assembler();
    let document: PipelineDocument = VIBRATION_PIPELINE.parse().unwrap();
    c.bench_function("assemble_vibration_pipeline", |b| {
        b.iter(|| black_box(assembler.build_document(&document).unwrap()));
    });
}

fn scoring_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let document: PipelineDocument = VIBRATION_PIPELINE.parse().unwrap();
    let pipeline = Arc::new(assembler().build_document(&document).unwrap());
    let frame = vibration_frame(100_000);

    let mut group = c.benchmark_group("score_100k_rows");
    for max_workers in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(max_workers), &max_workers, |b, &workers| {
            let scorer = ParallelScorer::new(ScoringConfig::new().with_max_workers(workers));
            b.iter(|| {
                let source = FrameBatchSource::new(frame.clone(), 1000).unwrap();
                let mut sink = CountingSink::default();
                runtime
                    .block_on(scorer.score_into(Arc::clone(&pipeline), source, &mut sink))
                    .unwrap();
                black_box(sink.rows)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, assembly_benchmark, scoring_benchmark);
criterion_main!(benches);
