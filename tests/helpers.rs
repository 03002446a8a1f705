//! Test utility functions for localci
#![allow(dead_code)]

use localci::backend::{
    BackendError, ContainerBackend, ContainerHandle, CreateOptions, ExecCommand, ExecOutput,
};
use localci::config::RunnerConfig;
use localci::core::{RunOutcome, RunResult, StepState, VariantResult, Workflow};
use localci::execution::{ExecutionEvent, SchedulingStrategy, WorkflowEngine};
use localci::persistence::RunStateTracker;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Key the helpers record runs under
pub const WORKFLOW_KEY: &str = "test";

/// A scripted answer for exec calls whose command line contains `pattern`
#[derive(Debug, Clone)]
struct ExecRule {
    pattern: String,
    exit_code: i32,
    output: String,
    delay: Option<Duration>,
}

/// A recorded `create` call
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub image: String,
    pub options: CreateOptions,
}

/// A recorded `exec` call
#[derive(Debug, Clone)]
pub struct ExecCall {
    pub container: String,
    pub argv: Vec<String>,
    pub env: IndexMap<String, String>,
    pub working_dir: Option<String>,
}

impl ExecCall {
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// The script of a `run:` step: the argument after `-c`
    pub fn script(&self) -> Option<&str> {
        let position = self.argv.iter().position(|arg| arg == "-c")?;
        self.argv.get(position + 1).map(String::as_str)
    }
}

/// Container backend that records every call and answers from a script.
///
/// Exec calls with no matching rule succeed with empty output. Buildx is
/// unavailable unless configured.
pub struct MockBackend {
    rules: Mutex<Vec<ExecRule>>,
    creates: Mutex<Vec<CreateCall>>,
    execs: Mutex<Vec<ExecCall>>,
    destroyed: Mutex<Vec<String>>,
    create_error: Option<String>,
    create_delay: Option<Duration>,
    buildx: Option<(String, String)>,
    buildx_queries: AtomicUsize,
    counter: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            creates: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            create_error: None,
            create_delay: None,
            buildx: None,
            buildx_queries: AtomicUsize::new(0),
            counter: AtomicUsize::new(0),
        }
    }

    /// Answer commands containing `pattern`. The first matching rule wins.
    pub fn respond(self, pattern: &str, exit_code: i32, output: &str) -> Self {
        self.rules.lock().unwrap().push(ExecRule {
            pattern: pattern.to_string(),
            exit_code,
            output: output.to_string(),
            delay: None,
        });
        self
    }

    /// Commands containing `pattern` take `delay` before succeeding
    pub fn slow(self, pattern: &str, delay: Duration) -> Self {
        self.rules.lock().unwrap().push(ExecRule {
            pattern: pattern.to_string(),
            exit_code: 0,
            output: String::new(),
            delay: Some(delay),
        });
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    /// `create` takes `delay` before returning
    pub fn slow_create(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_buildx(mut self, version: &str, listing: &str) -> Self {
        self.buildx = Some((version.to_string(), listing.to_string()));
        self
    }

    pub fn creates(&self) -> Vec<CreateCall> {
        self.creates.lock().unwrap().clone()
    }

    pub fn execs(&self) -> Vec<ExecCall> {
        self.execs.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Scripts of `run:` steps executed with the default bash shell, in order
    pub fn scripts(&self) -> Vec<String> {
        self.execs()
            .iter()
            .filter(|call| call.argv.first().map(String::as_str) == Some("bash"))
            .filter_map(|call| call.script().map(str::to_string))
            .collect()
    }

    /// Exec calls whose command line contains `pattern`
    pub fn execs_matching(&self, pattern: &str) -> Vec<ExecCall> {
        self.execs()
            .into_iter()
            .filter(|call| call.command_line().contains(pattern))
            .collect()
    }

    /// Number of times buildx was queried on the host
    pub fn buildx_queries(&self) -> usize {
        self.buildx_queries.load(Ordering::SeqCst)
    }

    fn rule_for(&self, command_line: &str) -> Option<ExecRule> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| command_line.contains(&rule.pattern))
            .cloned()
    }
}

#[async_trait]
impl ContainerBackend for MockBackend {
    async fn create(&self, image: &str, options: &CreateOptions) -> Result<ContainerHandle, BackendError> {
        self.creates.lock().unwrap().push(CreateCall {
            image: image.to_string(),
            options: options.clone(),
        });

        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.create_error {
            return Err(BackendError::CommandFailed {
                command: "docker run".to_string(),
                exit_code: 125,
                stderr: message.clone(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerHandle {
            id: format!("mock-{}", n),
            name: options.name.clone(),
            image: image.to_string(),
        })
    }

    async fn exec(&self, handle: &ContainerHandle, command: &ExecCommand) -> Result<ExecOutput, BackendError> {
        let call = ExecCall {
            container: handle.id.clone(),
            argv: command.argv.clone(),
            env: command.env.clone(),
            working_dir: command.working_dir.clone(),
        };
        let command_line = call.command_line();
        self.execs.lock().unwrap().push(call);

        match self.rule_for(&command_line) {
            Some(rule) => {
                if let Some(delay) = rule.delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(ExecOutput::new(rule.exit_code, rule.output))
            }
            None => Ok(ExecOutput::new(0, "")),
        }
    }

    async fn destroy(&self, handle: &ContainerHandle) -> Result<(), BackendError> {
        self.destroyed.lock().unwrap().push(handle.id.clone());
        Ok(())
    }

    async fn server_version(&self) -> Result<String, BackendError> {
        Ok("24.0.7".to_string())
    }

    async fn buildx_version(&self) -> Result<String, BackendError> {
        self.buildx_queries.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the probe
        tokio::time::sleep(Duration::from_millis(20)).await;
        match &self.buildx {
            Some((version, _)) => Ok(version.clone()),
            None => Err(BackendError::CommandFailed {
                command: "docker buildx version".to_string(),
                exit_code: 1,
                stderr: "docker: 'buildx' is not a docker command.".to_string(),
            }),
        }
    }

    async fn buildx_builders(&self) -> Result<String, BackendError> {
        match &self.buildx {
            Some((_, listing)) => Ok(listing.clone()),
            None => Err(BackendError::CommandFailed {
                command: "docker buildx ls".to_string(),
                exit_code: 1,
                stderr: "docker: 'buildx' is not a docker command.".to_string(),
            }),
        }
    }
}

/// A `docker buildx ls` listing with an active default builder
pub const BUILDX_LS_ACTIVE: &str = "NAME/NODE   DRIVER/ENDPOINT  STATUS   BUILDKIT  PLATFORMS\n\
default *   docker\n  \
default     default          running  v0.12.5   linux/amd64\n";

/// Runner config for tests: no package bootstrap
pub fn test_config() -> RunnerConfig {
    RunnerConfig::new().with_bootstrap_tools(false)
}

/// Engine over `backend` with its own tracker
pub fn engine(backend: Arc<MockBackend>) -> WorkflowEngine<MockBackend> {
    engine_with(backend, test_config(), SchedulingStrategy::Sequential)
}

pub fn engine_with(
    backend: Arc<MockBackend>,
    config: RunnerConfig,
    strategy: SchedulingStrategy,
) -> WorkflowEngine<MockBackend> {
    WorkflowEngine::new(backend, config, Arc::new(RunStateTracker::new())).with_strategy(strategy)
}

pub fn workflow_from_yaml(yaml: &str) -> Workflow {
    Workflow::from_yaml(yaml).expect("test workflow should parse")
}

/// Parse `yaml` and run it for `event` on a fresh sequential engine
pub async fn run_yaml(backend: Arc<MockBackend>, yaml: &str, event: &str) -> RunResult {
    let workflow = workflow_from_yaml(yaml);
    engine(backend).run(&workflow, WORKFLOW_KEY, event).await
}

/// Run `yaml` and collect every execution event
pub async fn run_yaml_with_events(
    backend: Arc<MockBackend>,
    yaml: &str,
    event: &str,
) -> (RunResult, Vec<ExecutionEvent>) {
    let workflow = workflow_from_yaml(yaml);
    let engine = engine(backend);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let result = engine.run(&workflow, WORKFLOW_KEY, event).await;
    let events = events.lock().unwrap().clone();
    (result, events)
}

/// The variant of `job` whose binding label is `binding` ("" for no matrix)
pub fn variant<'a>(result: &'a RunResult, job: &str, binding: &str) -> &'a VariantResult {
    result
        .variants
        .iter()
        .find(|v| v.job_id == job && v.binding.label() == binding)
        .unwrap_or_else(|| {
            panic!(
                "No variant {} [{}] in {:?}",
                job,
                binding,
                result.variants.iter().map(|v| v.label()).collect::<Vec<_>>()
            )
        })
}

pub fn step_state<'a>(variant: &'a VariantResult, index: usize) -> &'a StepState {
    &variant
        .steps
        .get(index)
        .unwrap_or_else(|| panic!("{} has no step {}", variant.label(), index))
        .state
}

/// Assert the run succeeded
pub fn assert_run_succeeded(result: &RunResult) {
    assert_eq!(
        result.outcome,
        RunOutcome::Success,
        "Expected success, got {} ({:?})",
        result.outcome,
        result.error
    );
}

/// Assert the run failed with an error containing `expected`
pub fn assert_run_failed(result: &RunResult, expected: &str) {
    assert_eq!(result.outcome, RunOutcome::Failure, "Expected failure");
    let error = result.error.as_deref().unwrap_or_default();
    assert!(
        error.contains(expected),
        "Run error '{}' does not contain '{}'",
        error,
        expected
    );
}

pub fn assert_step_completed(variant: &VariantResult, index: usize) {
    assert!(
        matches!(step_state(variant, index), StepState::Completed { .. }),
        "Step {} of {} is {:?}",
        index + 1,
        variant.label(),
        step_state(variant, index)
    );
}

pub fn assert_step_skipped(variant: &VariantResult, index: usize) {
    assert!(
        matches!(step_state(variant, index), StepState::Skipped { .. }),
        "Step {} of {} is {:?}",
        index + 1,
        variant.label(),
        step_state(variant, index)
    );
}

/// Every created container was destroyed exactly once
pub fn assert_all_containers_destroyed(backend: &MockBackend) {
    let mut destroyed = backend.destroyed();
    destroyed.sort();
    let before = destroyed.len();
    destroyed.dedup();
    assert_eq!(before, destroyed.len(), "A container was destroyed twice");

    let created = backend.creates().len();
    assert_eq!(
        destroyed.len(),
        created,
        "{} container(s) created but {} destroyed",
        created,
        destroyed.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_rules() {
        let backend = MockBackend::new().respond("make test", 2, "FAIL\n");
        let handle = backend.create("ubuntu:22.04", &CreateOptions::default()).await.unwrap();

        let out = backend.exec(&handle, &ExecCommand::shell("make test")).await.unwrap();
        assert_eq!(out.exit_code, 2);
        let out = backend.exec(&handle, &ExecCommand::shell("echo ok")).await.unwrap();
        assert!(out.success());

        backend.destroy(&handle).await.unwrap();
        assert_eq!(backend.execs().len(), 2);
        assert_all_containers_destroyed(&backend);
    }

    #[tokio::test]
    async fn test_mock_backend_create_failure() {
        let backend = MockBackend::new().failing_create("no such image");
        let err = backend
            .create("missing:latest", &CreateOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such image"));
    }
}
