use criterion::{Criterion, criterion_group, criterion_main};
use matrix_orchestrator::config::{Matrix, Step, Workflow};
use matrix_orchestrator::core::orchestrator::Orchestrator;
use matrix_orchestrator::planner::{expand, plan_execution};
use std::hint::black_box;
use tokio::runtime::Runtime;

fn ci_matrix() -> Matrix {
    Matrix::from_dimensions([
        ("os", vec!["ubuntu-latest", "windows-latest", "macos-latest"]),
        ("python-version", vec!["3.7", "3.8", "3.9", "3.10"]),
        ("browser", vec!["chromium", "firefox", "webkit"]),
        ("shard", vec!["1", "2", "3", "4"]),
    ])
}

fn bench_expand(c: &mut Criterion) {
    let matrix = ci_matrix();
    c.bench_function("expand_144", |b| b.iter(|| expand(black_box(&matrix))));

    let workflow = Workflow::new(ci_matrix(), vec![Step::new("Test", "pytest")]);
    c.bench_function("plan_sharded_144", |b| {
        b.iter(|| plan_execution(black_box(&workflow), &[], Some(4), Some(1)))
    });
}

#[cfg(unix)]
fn bench_run_plan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let project = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let matrix = Matrix::from_dimensions([("n", vec!["1", "2", "3", "4"])]);
    let workflow = Workflow::new(matrix, vec![Step::new("Echo", "echo bench")]);
    let orchestrator = Orchestrator::new(
        workflow,
        project.path().to_path_buf(),
        output.path().to_path_buf(),
    )
    .with_jobs(4);

    c.bench_function("run_plan_4_runs", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = orchestrator.run_all().await;
        });
    });
}

#[cfg(not(unix))]
fn bench_run_plan(_: &mut Criterion) {}

criterion_group!(benches, bench_expand, bench_run_plan);
criterion_main!(benches);
