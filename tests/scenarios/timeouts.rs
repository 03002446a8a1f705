//! Test: Timeouts - a hung step fails its variant and the container is removed

use crate::helpers::*;
use localci::core::{RunOutcome, StepState};
use localci::execution::SchedulingStrategy;
use std::sync::Arc;
use std::time::Duration;

const HANGING: &str = r#"
on: push
jobs:
  slow:
    steps:
      - name: Warm up
        run: echo warm
      - name: Hang
        run: sleep 3600
      - name: Never
        run: echo never
"#;

/// The variant deadline fails the in-flight step
#[tokio::test]
async fn test_variant_timeout() {
    let backend = Arc::new(MockBackend::new().slow("sleep 3600", Duration::from_secs(30)));
    let workflow = workflow_from_yaml(HANGING);
    let engine = engine_with(
        backend.clone(),
        test_config().with_run_timeout(1),
        SchedulingStrategy::Sequential,
    );

    let result = engine.run(&workflow, WORKFLOW_KEY, "push").await;

    assert_run_failed(&result, "timed out after 1 seconds");
    let slow = variant(&result, "slow", "");
    assert_step_completed(slow, 0);
    match step_state(slow, 1) {
        StepState::Failed { error, continued, .. } => {
            assert!(!continued);
            assert!(error.contains("timed out"));
        }
        other => panic!("Expected failed step, got {:?}", other),
    }
    assert!(matches!(step_state(slow, 2), StepState::Pending));
    assert_all_containers_destroyed(&backend);
}

/// A timed-out variant does not stop its siblings
#[tokio::test]
async fn test_timeout_in_one_variant() {
    let yaml = r#"
on: push
jobs:
  test:
    strategy:
      matrix:
        speed: [fast, stuck]
    steps:
      - run: ./run-${{ matrix.speed }}.sh
"#;
    let backend = Arc::new(MockBackend::new().slow("run-stuck", Duration::from_secs(30)));
    let workflow = workflow_from_yaml(yaml);
    let engine = engine_with(
        backend.clone(),
        test_config().with_run_timeout(1),
        SchedulingStrategy::Parallel,
    );

    let result = engine.run(&workflow, WORKFLOW_KEY, "push").await;

    assert_eq!(variant(&result, "test", "speed=fast").outcome, RunOutcome::Success);
    assert_eq!(variant(&result, "test", "speed=stuck").outcome, RunOutcome::Failure);
    assert_run_failed(&result, "test (speed=stuck): timed out after 1 seconds");
    assert_all_containers_destroyed(&backend);
}

/// A job's timeout-minutes replaces the runner deadline
#[tokio::test(start_paused = true)]
async fn test_job_timeout_minutes_overrides_runner_timeout() {
    let yaml = r#"
on: push
jobs:
  short:
    timeout-minutes: 1
    steps:
      - run: ./short-build.sh
  long:
    timeout-minutes: 5
    steps:
      - run: ./long-build.sh
"#;
    let backend = Arc::new(
        MockBackend::new()
            .slow("short-build", Duration::from_secs(120))
            .slow("long-build", Duration::from_secs(180)),
    );
    let workflow = workflow_from_yaml(yaml);

    // Runner deadline is shorter than `long` needs and longer than `short` allows
    let engine = engine_with(
        backend.clone(),
        test_config().with_run_timeout(90),
        SchedulingStrategy::Sequential,
    );
    let result = engine.run(&workflow, WORKFLOW_KEY, "push").await;

    assert_run_failed(&result, "timed out after 60 seconds");
    assert!(matches!(step_state(variant(&result, "short", ""), 0), StepState::Failed { .. }));

    let workflow = workflow_from_yaml(&yaml.replace("./short-build.sh", "echo quick"));
    let result = engine.run(&workflow, WORKFLOW_KEY, "push").await;
    assert_run_succeeded(&result);
    assert_step_completed(variant(&result, "long", ""), 0);
    assert_all_containers_destroyed(&backend);
}

/// A step's timeout-minutes fails only that step
#[tokio::test(start_paused = true)]
async fn test_step_timeout_minutes() {
    let yaml = r#"
on: push
jobs:
  build:
    steps:
      - name: Flaky download
        run: ./download.sh
        timeout-minutes: 1
        continue-on-error: true
      - name: Hang
        run: ./hang.sh
        timeout-minutes: 2
      - name: Never
        run: echo never
"#;
    let backend = Arc::new(
        MockBackend::new()
            .slow("download.sh", Duration::from_secs(90))
            .slow("hang.sh", Duration::from_secs(300)),
    );
    let result = run_yaml(backend.clone(), yaml, "push").await;

    assert_run_failed(&result, "step 2 (Hang) failed: timed out after 120 seconds");
    let build = variant(&result, "build", "");
    match step_state(build, 0) {
        StepState::Failed { error, continued, .. } => {
            assert!(continued);
            assert_eq!(error, "step 1 (Flaky download) failed: timed out after 60 seconds");
        }
        other => panic!("Expected failed step, got {:?}", other),
    }
    assert!(matches!(step_state(build, 2), StepState::Pending));
    assert!(backend.execs_matching("echo never").is_empty());
    assert_all_containers_destroyed(&backend);
}

/// An absurdly large timeout-minutes is treated as no practical limit
#[tokio::test(start_paused = true)]
async fn test_huge_timeout_minutes() {
    let yaml = r#"
on: push
jobs:
  build:
    timeout-minutes: 18446744073709551615
    steps:
      - run: ./build.sh
        timeout-minutes: 18446744073709551615
"#;
    let backend = Arc::new(MockBackend::new().slow("build.sh", Duration::from_secs(3600)));
    let result = run_yaml(backend.clone(), yaml, "push").await;

    assert_run_succeeded(&result);
    assert_step_completed(variant(&result, "build", ""), 0);
}

/// A deadline hit during provisioning still removes the container
#[tokio::test(start_paused = true)]
async fn test_timeout_while_provisioning() {
    let backend = Arc::new(MockBackend::new().slow_create(Duration::from_secs(120)));
    let workflow = workflow_from_yaml(HANGING);
    let engine = engine_with(
        backend.clone(),
        test_config().with_run_timeout(30),
        SchedulingStrategy::Sequential,
    );

    let result = engine.run(&workflow, WORKFLOW_KEY, "push").await;

    assert_run_failed(&result, "timed out after 30 seconds");
    let creates = backend.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(backend.destroyed(), vec![creates[0].options.name.clone()]);
    assert!(backend.execs().is_empty());
    assert!(matches!(step_state(variant(&result, "slow", ""), 0), StepState::Pending));
}
