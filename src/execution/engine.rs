//! Main execution engine - orchestrates a workflow run

use crate::{
    backend::{CapabilityProber, ContainerBackend},
    config::RunnerConfig,
    core::{matrix, trigger, MatrixBinding, RunOutcome, RunResult, VariantResult, Workflow},
    execution::{
        actions::ActionDispatcher,
        executor::{JobExecutor, VariantPlan},
        scheduler::{SchedulingStrategy, VariantScheduler},
    },
    persistence::RunStateTracker,
};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Detail recorded for jobs after a failed job
pub const NOT_STARTED_DETAIL: &str = "not started: an earlier job failed";

/// Events that can occur during a workflow run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    WorkflowStarted {
        run_id: Uuid,
        workflow: String,
        event: String,
    },
    WorkflowSkipped {
        workflow: String,
        reason: String,
    },
    JobStarted {
        job: String,
        variants: usize,
    },
    JobSkipped {
        job: String,
        reason: String,
    },
    VariantStarted {
        job: String,
        binding: MatrixBinding,
    },
    VariantSkipped {
        job: String,
        binding: MatrixBinding,
        reason: String,
    },
    StepStarted {
        job: String,
        binding: MatrixBinding,
        index: usize,
        name: String,
    },
    StepCompleted {
        job: String,
        binding: MatrixBinding,
        index: usize,
        name: String,
    },
    StepSkipped {
        job: String,
        binding: MatrixBinding,
        index: usize,
        name: String,
    },
    StepFailed {
        job: String,
        binding: MatrixBinding,
        index: usize,
        name: String,
        error: String,
        continued: bool,
    },
    VariantCompleted {
        job: String,
        binding: MatrixBinding,
        outcome: RunOutcome,
    },
    WorkflowCompleted {
        run_id: Uuid,
        workflow: String,
        outcome: RunOutcome,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, handler: EventHandler) {
        self.handlers.lock().await.push(handler);
    }

    /// Emit an event to all handlers
    pub async fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Runs workflows against a container backend
pub struct WorkflowEngine<B: ContainerBackend + 'static> {
    backend: Arc<B>,
    prober: Arc<CapabilityProber>,
    actions: Arc<ActionDispatcher>,
    config: RunnerConfig,
    scheduler: VariantScheduler,
    tracker: Arc<RunStateTracker>,
    events: EventEmitter,
    env_overrides: IndexMap<String, String>,
    secrets: IndexMap<String, String>,
}

impl<B: ContainerBackend + 'static> WorkflowEngine<B> {
    pub fn new(backend: Arc<B>, config: RunnerConfig, tracker: Arc<RunStateTracker>) -> Self {
        let dyn_backend: Arc<dyn ContainerBackend> = backend.clone();
        Self {
            prober: Arc::new(CapabilityProber::new(dyn_backend)),
            backend,
            actions: Arc::new(ActionDispatcher::with_builtins()),
            config,
            scheduler: VariantScheduler::new(SchedulingStrategy::Sequential),
            tracker,
            events: EventEmitter::new(),
            env_overrides: IndexMap::new(),
            secrets: IndexMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.scheduler = VariantScheduler::new(strategy);
        self
    }

    pub fn with_actions(mut self, actions: ActionDispatcher) -> Self {
        self.actions = Arc::new(actions);
        self
    }

    /// Share a prober, so several engines probe the host only once
    pub fn with_prober(mut self, prober: Arc<CapabilityProber>) -> Self {
        self.prober = prober;
        self
    }

    /// Variables layered over the workflow env and under each job env
    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env_overrides = env;
        self
    }

    pub fn with_secrets(mut self, secrets: IndexMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn prober(&self) -> &Arc<CapabilityProber> {
        &self.prober
    }

    pub fn tracker(&self) -> &Arc<RunStateTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(handler)).await;
    }

    /// Run `workflow` for `event`, recording the result under `key`.
    ///
    /// `key` is the name the workflow is tracked by, normally its file stem.
    pub async fn run(&self, workflow: &Workflow, key: &str, event: &str) -> RunResult {
        let display_name = workflow.display_name(key).to_string();

        if !trigger::should_run(workflow, event) {
            let reason = trigger::skip_reason(event);
            info!("Skipping workflow {}: {}", display_name, reason);
            self.events
                .emit(ExecutionEvent::WorkflowSkipped {
                    workflow: key.to_string(),
                    reason: reason.clone(),
                })
                .await;
            let result = RunResult::skipped(key, event, reason);
            self.tracker.record_run(&result).await;
            return result;
        }

        let run_id = Uuid::new_v4();
        info!("Starting workflow {} for {} ({})", display_name, event, run_id);
        self.tracker.mark_running(key, run_id).await;
        self.events
            .emit(ExecutionEvent::WorkflowStarted {
                run_id,
                workflow: key.to_string(),
                event: event.to_string(),
            })
            .await;

        let mut env = workflow.env.clone();
        for (name, value) in &self.env_overrides {
            env.insert(name.clone(), value.clone());
        }

        let executor = Arc::new(JobExecutor::new(
            self.backend.clone(),
            self.prober.clone(),
            self.actions.clone(),
            self.config.clone(),
            self.events.clone(),
        ));

        let mut variants: Vec<VariantResult> = Vec::new();
        let mut earlier_failure = false;

        for (job_id, job) in &workflow.jobs {
            let job = Arc::new(job.clone());
            let job_name = job.display_name(job_id).to_string();
            let bindings = matrix::expand(job.strategy.as_ref());

            if earlier_failure {
                info!("Not starting job {}: an earlier job failed", job_name);
                self.events
                    .emit(ExecutionEvent::JobSkipped {
                        job: job_id.clone(),
                        reason: NOT_STARTED_DETAIL.to_string(),
                    })
                    .await;
                variants.extend(bindings.into_iter().map(|binding| {
                    VariantResult::skipped(job_id.clone(), job_name.clone(), binding, NOT_STARTED_DETAIL)
                }));
                continue;
            }

            if let Some(needs) = &job.needs {
                debug!("Job {} needs {:?}; jobs run in declaration order", job_name, needs.jobs());
            }
            if !job.services.is_empty() {
                let names: Vec<&str> = job.services.keys().map(String::as_str).collect();
                warn!("Job {} declares services {:?}; services are not started", job_name, names);
            }
            if job.container.is_some() {
                warn!("Job {} declares a container; steps run in the runner image instead", job_name);
            }

            if bindings.is_empty() {
                warn!("Job {} has an empty matrix; nothing to run", job_name);
                continue;
            }

            info!("Running job {} ({} variant(s))", job_name, bindings.len());
            self.events
                .emit(ExecutionEvent::JobStarted {
                    job: job_id.clone(),
                    variants: bindings.len(),
                })
                .await;

            let plans: Vec<VariantPlan> = bindings
                .into_iter()
                .map(|binding| VariantPlan {
                    run_id,
                    workflow: display_name.clone(),
                    event: event.to_string(),
                    job_id: job_id.clone(),
                    job: job.clone(),
                    binding,
                    env: env.clone(),
                    secrets: self.secrets.clone(),
                })
                .collect();

            let results = self.scheduler.run(executor.clone(), plans).await;
            if results.iter().any(|r| r.outcome == RunOutcome::Failure) {
                earlier_failure = true;
            }
            variants.extend(results);
        }

        let result = RunResult::from_variants(run_id, key, event, variants);
        match result.outcome {
            RunOutcome::Failure => warn!(
                "Workflow {} failed: {}",
                display_name,
                result.error.as_deref().unwrap_or_default()
            ),
            outcome => info!("Workflow {} finished: {}", display_name, outcome),
        }

        self.tracker.record_run(&result).await;
        self.events
            .emit(ExecutionEvent::WorkflowCompleted {
                run_id,
                workflow: key.to_string(),
                outcome: result.outcome,
            })
            .await;

        result
    }
}
