//! Test: Triggers - workflows only run for the events they declare

use crate::helpers::*;
use localci::core::RunOutcome;
use localci::execution::ExecutionEvent;
use localci::persistence::RunStatus;
use std::sync::Arc;

const PR_ONLY: &str = r#"
on: pull_request
jobs:
  check:
    steps:
      - run: make check
"#;

/// A non-matching event skips the run before any container exists
#[tokio::test]
async fn test_mismatched_event_is_skipped() {
    let backend = Arc::new(MockBackend::new());
    let (result, events) = run_yaml_with_events(backend.clone(), PR_ONLY, "push").await;

    assert_eq!(result.outcome, RunOutcome::Skipped);
    assert!(result.error.as_deref().unwrap_or_default().contains("push"));
    assert!(result.variants.is_empty());
    assert!(backend.creates().is_empty());
    assert!(matches!(events.as_slice(), [ExecutionEvent::WorkflowSkipped { .. }]));
}

/// The matching event runs the workflow
#[tokio::test]
async fn test_matching_event_runs() {
    let backend = Arc::new(MockBackend::new());
    let result = run_yaml(backend.clone(), PR_ONLY, "pull_request").await;

    assert_run_succeeded(&result);
    assert_eq!(backend.scripts(), vec!["make check"]);
}

/// Mapping triggers match on their keys; filters are not applied
#[tokio::test]
async fn test_mapping_trigger() {
    let yaml = r#"
on:
  push:
    branches: [main]
  workflow_dispatch:
jobs:
  build:
    steps:
      - run: make
"#;
    for (event, expected) in [
        ("push", RunOutcome::Success),
        ("workflow_dispatch", RunOutcome::Success),
        ("release", RunOutcome::Skipped),
    ] {
        let backend = Arc::new(MockBackend::new());
        let result = run_yaml(backend, yaml, event).await;
        assert_eq!(result.outcome, expected, "event {}", event);
    }
}

/// Skipped runs are tracked as skipped, not success
#[tokio::test]
async fn test_tracker_records_skip() {
    let backend = Arc::new(MockBackend::new());
    let workflow = workflow_from_yaml(PR_ONLY);
    let engine = engine(backend);
    engine.run(&workflow, WORKFLOW_KEY, "push").await;

    assert_eq!(engine.tracker().query(WORKFLOW_KEY).await, RunStatus::Skipped);
}
