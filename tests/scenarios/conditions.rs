//! Test: Conditions - job and step `if:` handling

use crate::helpers::*;
use localci::core::RunOutcome;
use localci::execution::ExecutionEvent;
use std::sync::Arc;

/// Literal and wrapped false skip a step, true and success() run it
#[tokio::test]
async fn test_step_conditions() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: echo one
        if: false
      - run: echo two
        if: ${{ false }}
      - run: echo three
        if: success()
      - run: echo four
        if: ${{ true }}
      - run: echo five
        if: failure()
      - run: echo six
        if: always()
"#;
    let backend = Arc::new(MockBackend::new());
    let result = run_yaml(backend.clone(), yaml, "push").await;

    assert_run_succeeded(&result);
    let build = variant(&result, "build", "");
    assert_step_skipped(build, 0);
    assert_step_skipped(build, 1);
    assert_step_completed(build, 2);
    assert_step_completed(build, 3);
    assert_step_skipped(build, 4);
    assert_step_completed(build, 5);
    assert_eq!(backend.scripts(), vec!["echo three", "echo four", "echo six"]);
}

/// Conditions see the event and matrix after expansion
#[tokio::test]
async fn test_condition_with_context() {
    let yaml = r#"
on: [push, pull_request]
jobs:
  build:
    strategy:
      matrix:
        deploy: ["true", "false"]
    steps:
      - run: ./deploy.sh
        if: ${{ matrix.deploy }}
"#;
    let backend = Arc::new(MockBackend::new());
    let result = run_yaml(backend.clone(), yaml, "push").await;

    assert_run_succeeded(&result);
    assert_step_completed(variant(&result, "build", "deploy=true"), 0);
    assert_step_skipped(variant(&result, "build", "deploy=false"), 0);
    assert_eq!(backend.scripts(), vec!["./deploy.sh"]);
}

/// Unrecognised expressions fail open and the step runs
#[tokio::test]
async fn test_unknown_condition_runs() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - run: echo ran
        if: github.event_name == 'push'
"#;
    let backend = Arc::new(MockBackend::new());
    let result = run_yaml(backend.clone(), yaml, "push").await;

    assert_run_succeeded(&result);
    assert_eq!(backend.scripts(), vec!["echo ran"]);
}

/// A false job condition skips the job without creating a container
#[tokio::test]
async fn test_job_condition_skips_variant() {
    let yaml = r#"
on: push
jobs:
  docs:
    if: false
    steps:
      - run: mkdocs build
  build:
    steps:
      - run: make
"#;
    let backend = Arc::new(MockBackend::new());
    let (result, events) = run_yaml_with_events(backend.clone(), yaml, "push").await;

    assert_run_succeeded(&result);
    assert_eq!(variant(&result, "docs", "").outcome, RunOutcome::Skipped);
    assert_eq!(variant(&result, "build", "").outcome, RunOutcome::Success);
    assert_eq!(backend.creates().len(), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::VariantSkipped { job, .. } if job == "docs")));
}
