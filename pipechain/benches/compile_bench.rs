//! Benchmarks for graph layering and chain compilation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use pipechain::prelude::*;

/// `layers` layers of `width` nodes, each node feeding every node of the next layer.
fn layered_config(width: usize, layers: usize) -> PipelineConfig {
    let name = |layer: usize, i: usize| format!("n{layer}_{i}");
    let mut config = PipelineConfig::new("bench").with_queue("bench-q");

    for layer in 0..layers {
        let next: Vec<String> = if layer + 1 < layers {
            (0..width).map(|i| name(layer + 1, i)).collect()
        } else {
            Vec::new()
        };
        let next_refs: Vec<&str> = next.iter().map(String::as_str).collect();
        for i in 0..width {
            config = config
                .with_edges(name(layer, i), &next_refs)
                .with_task(name(layer, i), TaskDefinition::new(format!("tasks.n{layer}_{i}")));
        }
    }
    config
}

fn graph_benchmark(c: &mut Criterion) {
    let config = layered_config(20, 10);
    c.bench_function("graph_build_and_group_200", |b| {
        b.iter(|| {
            let graph = ExecutionGraphBuilder::build(black_box(&config)).unwrap();
            black_box(graph.chainable_groups())
        });
    });
}

fn compile_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = layered_config(20, 10);
    let compiler = ChainCompiler::new(Arc::new(InMemoryCache::new()), &EngineSettings::default());

    c.bench_function("compile_fresh_200", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let chain = compiler
                    .compile(CompileRequest::fresh("bench", config.clone()))
                    .await
                    .unwrap();
                black_box(chain)
            })
        });
    });
}

criterion_group!(benches, graph_benchmark, compile_benchmark);
criterion_main!(benches);
