//! Scheduler throughput benchmarks: linear chains and wide fan-outs of
//! trivial function vertices, measuring pure orchestration overhead.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flowgraph_core::{Guard, RunOptions, Scheduler, Vertex, Workflow};
use serde_json::json;

fn linear_chain(len: usize) -> Workflow {
    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::source("src", vec![]));
    let mut prev = "src".to_string();
    for n in 0..len {
        let id = format!("step{n}");
        workflow.add_vertex(
            Vertex::function(id.as_str(), |input| {
                Box::pin(async move {
                    let v = input["v"].as_i64().unwrap_or(0);
                    Ok(json!({"v": v + 1}))
                })
            })
            .bind_from(prev.as_str(), Some("v"), "v"),
        );
        workflow.add_edge(prev.as_str(), id.as_str(), Guard::Always);
        prev = id;
    }
    workflow
}

fn fan_out(width: usize) -> Workflow {
    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::source("src", vec![]));
    for n in 0..width {
        let id = format!("leaf{n}");
        workflow.add_vertex(Vertex::function(id.as_str(), |input| {
            Box::pin(async move { Ok(input) })
        }));
        workflow.add_edge("src", id.as_str(), Guard::Always);
    }
    workflow
}

fn bench_linear(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("linear_chain");
    for len in [8usize, 32, 128] {
        let workflow = linear_chain(len);
        let scheduler = Scheduler::default();
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    scheduler
                        .run(&workflow, RunOptions::new().with_inputs(json!({"v": 0})))
                        .await
                        .expect("run")
                })
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("fan_out");
    for width in [8usize, 64] {
        let workflow = fan_out(width);
        let scheduler = Scheduler::default();
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    scheduler
                        .run(&workflow, RunOptions::new())
                        .await
                        .expect("run")
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_linear, bench_fan_out);
criterion_main!(benches);
