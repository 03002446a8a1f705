//! Job executor - runs one job variant inside a disposable container

use crate::{
    backend::{BackendError, CapabilityProber, ContainerBackend, ContainerHandle, CreateOptions, ExecCommand},
    config::{RunnerConfig, CONTAINER_HOME, CONTAINER_WORKSPACE},
    core::{
        condition,
        expression::expand,
        workflow::scalar_to_string,
        ExecutionContext, Job, MatrixBinding, RunOutcome, Step, StepRecord, StepState, VariantResult,
        VariantState,
    },
    execution::{
        actions::{ActionContext, ActionDispatcher, ActionError, ActionRequest},
        engine::{EventEmitter, ExecutionEvent},
    },
};
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lines of output quoted in a failure detail
const FAILURE_TAIL_LINES: usize = 5;

/// Error types for a single step
#[derive(Debug, Error)]
pub enum StepError {
    #[error("exit code {exit_code}: {tail}")]
    NonZeroExit { exit_code: i32, tail: String },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

/// Everything needed to run one variant of a job
#[derive(Debug, Clone)]
pub struct VariantPlan {
    pub run_id: Uuid,
    pub workflow: String,
    pub event: String,
    pub job_id: String,
    pub job: Arc<Job>,
    pub binding: MatrixBinding,
    /// Workflow env with caller overrides applied
    pub env: IndexMap<String, String>,
    pub secrets: IndexMap<String, String>,
}

impl VariantPlan {
    pub fn job_name(&self) -> String {
        self.job.display_name(&self.job_id).to_string()
    }
}

/// Owns a container for the life of a variant.
///
/// `release` destroys it on the normal path. If the guard is dropped
/// without being released (panic or cancellation) the destroy is spawned on
/// the current runtime instead.
struct ContainerGuard<B: ContainerBackend + 'static> {
    backend: Arc<B>,
    handle: Option<ContainerHandle>,
}

impl<B: ContainerBackend + 'static> ContainerGuard<B> {
    fn new(backend: Arc<B>, handle: ContainerHandle) -> Self {
        Self {
            backend,
            handle: Some(handle),
        }
    }

    fn handle(&self) -> Option<&ContainerHandle> {
        self.handle.as_ref()
    }

    async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.backend.destroy(&handle).await {
                warn!("Failed to remove container {}: {}", handle.name, e);
            }
        }
    }
}

impl<B: ContainerBackend + 'static> Drop for ContainerGuard<B> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let backend = self.backend.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = backend.destroy(&handle).await {
                        warn!("Failed to remove container {}: {}", handle.name, e);
                    }
                });
            }
            Err(_) => warn!("No runtime to remove container {}; it may be left running", handle.name),
        }
    }
}

/// Mutable progress of one variant
struct VariantRun<B: ContainerBackend + 'static> {
    context: ExecutionContext,
    state: VariantState,
    steps: Vec<StepRecord>,
    output: String,
    container: Option<ContainerGuard<B>>,
    /// Name and image of a container whose `create` has not returned yet
    provisioning: Option<(String, String)>,
}

impl<B: ContainerBackend + 'static> VariantRun<B> {
    fn append_output(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let masked = self.context.mask(text);
        self.output.push_str(&masked);
        if !masked.ends_with('\n') {
            self.output.push('\n');
        }
    }
}

/// Runs job variants against a container backend
pub struct JobExecutor<B: ContainerBackend + 'static> {
    backend: Arc<B>,
    prober: Arc<CapabilityProber>,
    actions: Arc<ActionDispatcher>,
    config: RunnerConfig,
    events: EventEmitter,
}

impl<B: ContainerBackend + 'static> JobExecutor<B> {
    pub fn new(
        backend: Arc<B>,
        prober: Arc<CapabilityProber>,
        actions: Arc<ActionDispatcher>,
        config: RunnerConfig,
        events: EventEmitter,
    ) -> Self {
        Self {
            backend,
            prober,
            actions,
            config,
            events,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Deadline for a variant of `job`
    fn variant_timeout_secs(&self, job: &Job) -> u64 {
        job.timeout_minutes
            .map(|minutes| minutes.saturating_mul(60))
            .unwrap_or(self.config.run_timeout_secs)
    }

    fn build_context(&self, plan: &VariantPlan) -> ExecutionContext {
        let mut context = ExecutionContext::new(plan.workflow.clone(), plan.event.clone())
            .with_job(plan.job_id.clone())
            .with_matrix(plan.binding.clone())
            .with_secrets(plan.secrets.clone());
        context.merge_env(&plan.env);

        let job_env: IndexMap<String, String> = plan
            .job
            .env
            .iter()
            .map(|(key, value)| (key.clone(), expand(value, &context)))
            .collect();
        context.merge_env(&job_env);
        context
    }

    /// Run one variant to completion. Never fails: every error ends up in
    /// the returned result.
    pub async fn execute_variant(&self, plan: VariantPlan) -> VariantResult {
        let job_name = plan.job_name();
        let started_at = Utc::now();
        let context = self.build_context(&plan);

        if !condition::evaluate(plan.job.condition.as_deref(), &context).should_run() {
            let reason = format!(
                "job condition '{}' evaluated to skip",
                plan.job.condition.as_deref().unwrap_or_default()
            );
            info!("Skipping job {}: {}", job_name, reason);
            self.events
                .emit(ExecutionEvent::VariantSkipped {
                    job: plan.job_id.clone(),
                    binding: plan.binding.clone(),
                    reason: reason.clone(),
                })
                .await;
            return VariantResult::skipped(plan.job_id.clone(), job_name, plan.binding.clone(), reason);
        }

        info!("Starting job {} {}", job_name, plan.binding);
        self.events
            .emit(ExecutionEvent::VariantStarted {
                job: plan.job_id.clone(),
                binding: plan.binding.clone(),
            })
            .await;

        let mut run: VariantRun<B> = VariantRun {
            context,
            state: VariantState::Pending,
            steps: plan
                .job
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| StepRecord {
                    index,
                    name: step.display_name(index),
                    state: StepState::Pending,
                })
                .collect(),
            output: String::new(),
            container: None,
            provisioning: None,
        };

        let timeout_secs = self.variant_timeout_secs(&plan.job);
        let outcome = timeout(Duration::from_secs(timeout_secs), self.run_variant(&plan, &mut run)).await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(detail)) => Some(detail),
            Err(_) => {
                let detail = StepError::Timeout(timeout_secs).to_string();
                Self::fail_in_flight_step(&mut run, &detail);
                self.remove_half_created(&mut run).await;
                Some(detail)
            }
        };

        if let Some(guard) = run.container.take() {
            guard.release().await;
        }

        let (outcome, error) = match failure {
            None => {
                run.state = VariantState::Succeeded;
                info!("Job {} {} succeeded", job_name, plan.binding);
                (RunOutcome::Success, None)
            }
            Some(detail) => {
                let detail = run.context.mask(&detail);
                error!("Job {} {} failed: {}", job_name, plan.binding, detail);
                run.state = VariantState::Failed { error: detail.clone() };
                (RunOutcome::Failure, Some(detail))
            }
        };

        self.events
            .emit(ExecutionEvent::VariantCompleted {
                job: plan.job_id.clone(),
                binding: plan.binding.clone(),
                outcome,
            })
            .await;

        VariantResult {
            job_id: plan.job_id.clone(),
            job_name,
            binding: plan.binding,
            outcome,
            error,
            steps: run.steps,
            started_at,
            completed_at: Utc::now(),
            output: run.output,
        }
    }

    /// Mark the step that was running when the deadline hit as failed
    fn fail_in_flight_step(run: &mut VariantRun<B>, detail: &str) {
        if let VariantState::Running { step } = run.state {
            if let Some(record) = run.steps.get_mut(step) {
                let started_at = match record.state {
                    StepState::Running { started_at } => started_at,
                    _ => Utc::now(),
                };
                record.state = StepState::Failed {
                    error: detail.to_string(),
                    continued: false,
                    started_at,
                    failed_at: Utc::now(),
                };
            }
        }
    }

    /// The deadline hit while `create` was in flight. The daemon may have
    /// started the container anyway, so remove it by name.
    async fn remove_half_created(&self, run: &mut VariantRun<B>) {
        if run.container.is_some() {
            return;
        }
        let Some((name, image)) = run.provisioning.take() else {
            return;
        };
        let handle = ContainerHandle {
            id: name.clone(),
            name,
            image,
        };
        debug!("Removing container {} after provisioning timed out", handle.name);
        if let Err(e) = self.backend.destroy(&handle).await {
            debug!("No container {} to remove: {}", handle.name, e);
        }
    }

    /// Provision, bootstrap and run every step. `Err` carries the failure detail.
    async fn run_variant(&self, plan: &VariantPlan, run: &mut VariantRun<B>) -> Result<(), String> {
        run.state = VariantState::Provisioning;

        let runs_on = plan
            .job
            .runs_on
            .as_ref()
            .and_then(|r| r.primary())
            .map(|label| expand(label, &run.context));
        let image = self.config.image_for(runs_on.as_deref()).to_string();

        let mut labels = IndexMap::new();
        labels.insert("localci.run".to_string(), plan.run_id.to_string());
        labels.insert("localci.job".to_string(), plan.job_id.clone());

        let options = CreateOptions {
            name: container_name(&plan.job_id),
            env: run.context.container_env(),
            working_dir: Some(CONTAINER_WORKSPACE.to_string()),
            labels,
        };

        debug!("Creating container {} from {}", options.name, image);
        run.provisioning = Some((options.name.clone(), image.clone()));
        let created = self.backend.create(&image, &options).await;
        run.provisioning = None;
        let handle = created.map_err(|e| format!("failed to provision container: {}", e))?;
        run.container = Some(ContainerGuard::new(self.backend.clone(), handle.clone()));

        self.bootstrap(&handle).await;

        for (index, step) in plan.job.steps.iter().enumerate() {
            run.state = VariantState::Running { step: index };
            self.execute_step(plan, run, &handle, index, step).await?;
        }

        Ok(())
    }

    /// Prepare the workspace. Failures are logged and ignored.
    async fn bootstrap(&self, handle: &ContainerHandle) {
        let mut commands = vec![
            ExecCommand::new(["mkdir", "-p", CONTAINER_WORKSPACE]),
            ExecCommand::new(["mkdir", "-p", CONTAINER_HOME]),
        ];
        if self.config.bootstrap_tools {
            commands.push(ExecCommand::new(["apt-get", "update", "-qq"]));
            commands.push(ExecCommand::new([
                "apt-get", "install", "-y", "-qq", "git", "curl", "wget", "unzip",
            ]));
        }

        for command in commands {
            match self.backend.exec(handle, &command).await {
                Ok(output) if output.success() => debug!("bootstrap: {} ok", command.display()),
                Ok(output) => warn!(
                    "Workspace setup command `{}` exited with code {}",
                    command.display(),
                    output.exit_code
                ),
                Err(e) => warn!("Workspace setup command `{}` failed: {}", command.display(), e),
            }
        }
    }

    async fn execute_step(
        &self,
        plan: &VariantPlan,
        run: &mut VariantRun<B>,
        handle: &ContainerHandle,
        index: usize,
        step: &Step,
    ) -> Result<(), String> {
        let name = run.steps[index].name.clone();

        if !condition::evaluate(step.condition.as_deref(), &run.context).should_run() {
            let reason = format!(
                "condition '{}' evaluated to skip",
                step.condition.as_deref().unwrap_or_default()
            );
            info!("Skipping step {} ({}): {}", index + 1, name, reason);
            run.steps[index].state = StepState::Skipped { reason };
            self.emit_step(plan, index, &name, StepEvent::Skipped).await;
            return Ok(());
        }

        info!("Running step {} ({})", index + 1, name);
        let started_at = Utc::now();
        run.steps[index].state = StepState::Running { started_at };
        self.emit_step(plan, index, &name, StepEvent::Started).await;

        let mut buffer = String::new();
        let result = match step.timeout_minutes {
            Some(minutes) => {
                let secs = minutes.saturating_mul(60);
                match timeout(
                    Duration::from_secs(secs),
                    self.run_step_body(&run.context, handle, step, &mut buffer),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StepError::Timeout(secs)),
                }
            }
            None => self.run_step_body(&run.context, handle, step, &mut buffer).await,
        };
        run.append_output(&buffer);

        match result {
            Ok(()) => {
                if let (Some(id), Some(_)) = (&step.id, &step.run) {
                    self.collect_outputs(run, handle, id).await;
                }
                run.steps[index].state = StepState::Completed {
                    started_at,
                    completed_at: Utc::now(),
                };
                self.emit_step(plan, index, &name, StepEvent::Completed).await;
                Ok(())
            }
            Err(e) => {
                let detail = run
                    .context
                    .mask(&format!("step {} ({}) failed: {}", index + 1, name, e));
                let continued = step.continue_on_error;
                run.steps[index].state = StepState::Failed {
                    error: detail.clone(),
                    continued,
                    started_at,
                    failed_at: Utc::now(),
                };
                self.emit_step(
                    plan,
                    index,
                    &name,
                    StepEvent::Failed {
                        error: detail.clone(),
                        continued,
                    },
                )
                .await;

                if continued {
                    warn!("{} (continue-on-error)", detail);
                    Ok(())
                } else {
                    Err(detail)
                }
            }
        }
    }

    /// Run the `run:` script or the `uses:` action of a step.
    /// Raw output is appended to `buffer` as it is produced.
    async fn run_step_body(
        &self,
        context: &ExecutionContext,
        handle: &ContainerHandle,
        step: &Step,
        buffer: &mut String,
    ) -> Result<(), StepError> {
        let mut env: IndexMap<String, String> = step
            .env
            .iter()
            .map(|(key, value)| (key.clone(), expand(value, context)))
            .collect();

        if let Some(script) = &step.run {
            if let Some(id) = &step.id {
                env.insert("GITHUB_OUTPUT".to_string(), output_file(id));
            }
            let script = expand(script, context);
            let working_dir = step
                .working_directory
                .as_deref()
                .map(|dir| resolve_working_dir(&expand(dir, context)))
                .unwrap_or_else(|| CONTAINER_WORKSPACE.to_string());

            let command = ExecCommand::new(shell_command(step.shell.as_deref(), &script))
                .with_env(env)
                .with_working_dir(working_dir);
            debug!("exec: {}", command.display());

            let output = self.backend.exec(handle, &command).await?;
            buffer.push_str(&output.output);
            if !output.success() {
                return Err(StepError::NonZeroExit {
                    exit_code: output.exit_code,
                    tail: output.tail(FAILURE_TAIL_LINES),
                });
            }
            return Ok(());
        }

        if let Some(uses) = &step.uses {
            let uses = expand(uses, context);
            let with: IndexMap<String, String> = step
                .with
                .iter()
                .map(|(key, value)| (key.clone(), expand(&scalar_to_string(value), context)))
                .collect();

            let backend: &dyn ContainerBackend = self.backend.as_ref();
            let action_context = ActionContext {
                backend,
                prober: self.prober.as_ref(),
                container: handle,
            };
            let request = ActionRequest {
                uses: &uses,
                with: &with,
                env: &env,
            };

            let outcome = self.actions.dispatch(&action_context, &request).await?;
            buffer.push_str(&outcome.output());
            return Ok(());
        }

        debug!("Step has neither run nor uses; nothing to do");
        Ok(())
    }

    /// Read `name=value` lines the step wrote to its `GITHUB_OUTPUT` file
    async fn collect_outputs(&self, run: &mut VariantRun<B>, handle: &ContainerHandle, step_id: &str) {
        let command = ExecCommand::new(["cat".to_string(), output_file(step_id)]);
        let output = match self.backend.exec(handle, &command).await {
            Ok(output) if output.success() => output,
            Ok(_) => return,
            Err(e) => {
                debug!("Could not read outputs of step {}: {}", step_id, e);
                return;
            }
        };

        for line in output.output.lines() {
            if let Some((name, value)) = line.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    run.context.set_step_output(step_id, name, value.to_string());
                }
            }
        }
    }

    async fn emit_step(&self, plan: &VariantPlan, index: usize, name: &str, event: StepEvent) {
        let job = plan.job_id.clone();
        let binding = plan.binding.clone();
        let name = name.to_string();
        let event = match event {
            StepEvent::Started => ExecutionEvent::StepStarted { job, binding, index, name },
            StepEvent::Completed => ExecutionEvent::StepCompleted { job, binding, index, name },
            StepEvent::Skipped => ExecutionEvent::StepSkipped { job, binding, index, name },
            StepEvent::Failed { error, continued } => ExecutionEvent::StepFailed {
                job,
                binding,
                index,
                name,
                error,
                continued,
            },
        };
        self.events.emit(event).await;
    }
}

enum StepEvent {
    Started,
    Completed,
    Skipped,
    Failed { error: String, continued: bool },
}

/// Command line for a `run:` script under the given `shell:`
pub fn shell_command(shell: Option<&str>, script: &str) -> Vec<String> {
    let mut argv: Vec<String> = match shell.map(str::trim) {
        None | Some("") | Some("bash") => ["bash", "--noprofile", "--norc", "-eo", "pipefail", "-c"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        Some("sh") => vec!["sh".to_string(), "-e".to_string(), "-c".to_string()],
        Some(other) => vec![other.to_string(), "-c".to_string()],
    };
    argv.push(script.to_string());
    argv
}

/// Per-step file a `run:` step appends its outputs to
fn output_file(step_id: &str) -> String {
    format!("{}/outputs-{}", CONTAINER_HOME, step_id)
}

/// Relative working directories are taken from the workspace
fn resolve_working_dir(dir: &str) -> String {
    if dir.starts_with('/') {
        dir.to_string()
    } else {
        format!("{}/{}", CONTAINER_WORKSPACE, dir.trim_start_matches("./"))
    }
}

fn container_name(job_id: &str) -> String {
    let job: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("localci-{}-{}", job, &suffix[..8])
}
