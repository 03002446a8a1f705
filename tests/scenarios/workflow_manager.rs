//! Test: Workflow Manager - discovery, loading and state queries on disk

use crate::helpers::*;
use localci::core::{RunOutcome, WorkflowError};
use localci::workspace::WorkflowManager;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let workflows = dir.path().join(".github").join("workflows");
    fs::create_dir_all(&workflows).unwrap();
    for (name, content) in files {
        fs::write(workflows.join(name), content).unwrap();
    }
    dir
}

fn manager(backend: Arc<MockBackend>, root: &Path) -> WorkflowManager<MockBackend> {
    let config = test_config().with_workspace(root);
    WorkflowManager::new(engine_with(
        backend,
        config,
        localci::execution::SchedulingStrategy::Sequential,
    ))
}

const CI: &str = r#"
name: CI
on: [push, pull_request]
jobs:
  test:
    steps:
      - run: make test
"#;

const LINT: &str = r#"
on: push
jobs:
  lint:
    steps:
      - run: make lint
"#;

#[tokio::test]
async fn test_run_by_name_and_query_state() {
    let dir = project(&[("ci.yml", CI), ("lint.yaml", LINT)]);
    let backend = Arc::new(MockBackend::new().respond("make lint", 1, "style errors\n"));
    let manager = manager(backend, dir.path());

    assert_eq!(manager.names().unwrap(), vec!["ci", "lint"]);
    assert!(manager.workflow_exists("ci"));
    assert!(manager.workflow_exists("lint"));
    assert!(!manager.workflow_exists("deploy"));

    assert!(!manager.last_run_succeeded("ci").await);
    assert!(!manager.last_run_failed("ci").await);

    let ci = manager.run("ci", "push").await.unwrap();
    assert_eq!(ci.outcome, RunOutcome::Success);
    assert_eq!(ci.workflow, "ci");
    assert!(manager.last_run_succeeded("ci").await);

    let lint = manager.run("lint.yaml", "push").await.unwrap();
    assert_eq!(lint.outcome, RunOutcome::Failure);
    assert!(manager.last_run_failed("lint").await);
    assert!(!manager.last_run_succeeded("lint").await);
}

#[tokio::test]
async fn test_missing_workflow_is_definition_error() {
    let dir = project(&[("ci.yml", CI)]);
    let backend = Arc::new(MockBackend::new());
    let manager = manager(backend.clone(), dir.path());

    let err = manager.run("deploy", "push").await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert!(err.to_string().contains("workflow file not found: deploy"));
    assert!(backend.creates().is_empty());
}

#[tokio::test]
async fn test_invalid_workflow_never_starts() {
    let dir = project(&[
        ("broken.yml", "on: push\njobs: [this is not a mapping\n"),
        ("empty.yml", "on: push\njobs: {}\n"),
    ]);
    let backend = Arc::new(MockBackend::new());
    let manager = manager(backend.clone(), dir.path());

    assert!(matches!(
        manager.run("broken", "push").await,
        Err(WorkflowError::Parse(_))
    ));
    assert!(matches!(
        manager.run("empty", "push").await,
        Err(WorkflowError::Invalid(_))
    ));
    assert!(backend.creates().is_empty());
}

#[tokio::test]
async fn test_platform_directory() {
    let dir = TempDir::new().unwrap();
    let workflows = dir.path().join(".gitea").join("workflows");
    fs::create_dir_all(&workflows).unwrap();
    fs::write(workflows.join("build.yml"), LINT).unwrap();

    let config = test_config().with_workspace(dir.path()).with_platform("gitea");
    let manager = WorkflowManager::new(engine_with(
        Arc::new(MockBackend::new()),
        config,
        localci::execution::SchedulingStrategy::Sequential,
    ));

    assert_eq!(manager.names().unwrap(), vec!["build"]);
    assert!(manager.run("build", "push").await.unwrap().succeeded());
}
