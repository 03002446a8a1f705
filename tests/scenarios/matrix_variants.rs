//! Test: Matrix Variants - one isolated container per binding

use crate::helpers::*;
use localci::core::RunOutcome;
use localci::execution::SchedulingStrategy;
use std::sync::Arc;

const MATRIX_WORKFLOW: &str = r#"
on: [push, pull_request]
jobs:
  test:
    runs-on: ${{ matrix.os }}
    strategy:
      matrix:
        os: [a, b]
        node: [1, 2]
    steps:
      - name: Show
        run: echo "os=${{ matrix.os }} node=${{ matrix.node }}"
"#;

/// Bindings expand in axis declaration order
#[tokio::test]
async fn test_variants_in_deterministic_order() {
    let backend = Arc::new(MockBackend::new());
    let result = run_yaml(backend.clone(), MATRIX_WORKFLOW, "push").await;

    assert_run_succeeded(&result);
    let labels: Vec<String> = result.variants.iter().map(|v| v.binding.label()).collect();
    assert_eq!(
        labels,
        vec!["os=a, node=1", "os=a, node=2", "os=b, node=1", "os=b, node=2"]
    );
    assert_eq!(
        backend.scripts(),
        vec![
            "echo \"os=a node=1\"",
            "echo \"os=a node=2\"",
            "echo \"os=b node=1\"",
            "echo \"os=b node=2\"",
        ]
    );
}

/// Each variant gets its own container with MATRIX_* variables
#[tokio::test]
async fn test_each_variant_isolated() {
    let backend = Arc::new(MockBackend::new());
    run_yaml(backend.clone(), MATRIX_WORKFLOW, "push").await;

    let creates = backend.creates();
    assert_eq!(creates.len(), 4);
    let first = &creates[0].options.env;
    assert_eq!(first.get("MATRIX_OS").map(String::as_str), Some("a"));
    assert_eq!(first.get("MATRIX_NODE").map(String::as_str), Some("1"));
    let last = &creates[3].options.env;
    assert_eq!(last.get("MATRIX_OS").map(String::as_str), Some("b"));
    assert_eq!(last.get("MATRIX_NODE").map(String::as_str), Some("2"));

    // Unknown runner labels fall back to the default image
    assert!(creates.iter().all(|c| c.image == "ubuntu:22.04"));
    assert_all_containers_destroyed(&backend);
}

/// One failing variant fails the run but its siblings still run
#[tokio::test]
async fn test_one_variant_fails() {
    let backend = Arc::new(MockBackend::new().respond("os=b node=1", 1, "unsupported\n"));
    let result = run_yaml(backend.clone(), MATRIX_WORKFLOW, "push").await;

    assert_run_failed(&result, "test (os=b, node=1): step 1 (Show) failed");
    assert_eq!(variant(&result, "test", "os=b, node=1").outcome, RunOutcome::Failure);
    assert_eq!(variant(&result, "test", "os=a, node=1").outcome, RunOutcome::Success);
    assert_eq!(variant(&result, "test", "os=b, node=2").outcome, RunOutcome::Success);
    assert_eq!(result.failed_variants().count(), 1);
}

/// Parallel scheduling keeps results in binding order
#[tokio::test]
async fn test_parallel_results_keep_order() {
    let backend = Arc::new(MockBackend::new());
    let workflow = workflow_from_yaml(MATRIX_WORKFLOW);
    let engine = engine_with(backend.clone(), test_config(), SchedulingStrategy::LimitedParallel(2));
    let result = engine.run(&workflow, WORKFLOW_KEY, "pull_request").await;

    assert_run_succeeded(&result);
    let labels: Vec<String> = result.variants.iter().map(|v| v.binding.label()).collect();
    assert_eq!(
        labels,
        vec!["os=a, node=1", "os=a, node=2", "os=b, node=1", "os=b, node=2"]
    );
    assert_eq!(backend.creates().len(), 4);
    assert_all_containers_destroyed(&backend);
}

/// An axis with no values yields no variants
#[tokio::test]
async fn test_empty_axis_runs_nothing() {
    let yaml = r#"
on: push
jobs:
  test:
    strategy:
      matrix:
        os: []
    steps:
      - run: echo never
"#;
    let backend = Arc::new(MockBackend::new());
    let result = run_yaml(backend.clone(), yaml, "push").await;

    assert_run_succeeded(&result);
    assert!(result.variants.is_empty());
    assert!(backend.creates().is_empty());
}
