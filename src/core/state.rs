//! Execution state and result models

use crate::core::matrix::MatrixBinding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Final outcome of a variant or a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure,
    /// Nothing ran: the trigger did not match or a condition skipped it
    Skipped,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunOutcome::Success => "success",
            RunOutcome::Failure => "failure",
            RunOutcome::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// Lifecycle of one job variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantState {
    Pending,
    /// Container is being created and bootstrapped
    Provisioning,
    /// Executing the step at this zero-based index
    Running { step: usize },
    Succeeded,
    Failed { error: String },
    Skipped { reason: String },
}

impl VariantState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VariantState::Succeeded | VariantState::Failed { .. } | VariantState::Skipped { .. }
        )
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        match self {
            VariantState::Succeeded => Some(RunOutcome::Success),
            VariantState::Failed { .. } => Some(RunOutcome::Failure),
            VariantState::Skipped { .. } => Some(RunOutcome::Skipped),
            _ => None,
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been reached
    Pending,
    /// Step is currently running
    Running { started_at: DateTime<Utc> },
    /// Step completed successfully
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed. `continued` is set when `continue-on-error` let the
    /// variant carry on.
    Failed {
        error: String,
        continued: bool,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step condition evaluated to skip
    Skipped { reason: String },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running { .. } => "running",
            StepState::Completed { .. } => "success",
            StepState::Failed { continued: true, .. } => "failure (continued)",
            StepState::Failed { .. } => "failure",
            StepState::Skipped { .. } => "skipped",
        }
    }
}

/// A step and where it ended up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based position in the job
    pub index: usize,
    pub name: String,
    pub state: StepState,
}

/// Result of one job variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub job_id: String,
    pub job_name: String,
    pub binding: MatrixBinding,
    pub outcome: RunOutcome,
    pub error: Option<String>,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Captured step output, secrets masked
    pub output: String,
}

impl VariantResult {
    /// A variant that never reached provisioning
    pub fn skipped(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        binding: MatrixBinding,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            binding,
            outcome: RunOutcome::Skipped,
            error: Some(reason.into()),
            steps: Vec::new(),
            started_at: now,
            completed_at: now,
            output: String::new(),
        }
    }

    /// `job` or `job (os=a, node=1)`
    pub fn label(&self) -> String {
        if self.binding.is_empty() {
            self.job_name.clone()
        } else {
            format!("{} ({})", self.job_name, self.binding.label())
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Result of running one workflow for one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub workflow: String,
    pub event: String,
    pub outcome: RunOutcome,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub variants: Vec<VariantResult>,
    pub output: String,
}

impl RunResult {
    /// A run that never started because the trigger did not match
    pub fn skipped(workflow: impl Into<String>, event: impl Into<String>, reason: String) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow: workflow.into(),
            event: event.into(),
            outcome: RunOutcome::Skipped,
            timestamp: Utc::now(),
            error: Some(reason),
            variants: Vec::new(),
            output: String::new(),
        }
    }

    /// Aggregate variant results: any failed variant fails the run.
    ///
    /// The error detail is taken from the first failed variant.
    pub fn from_variants(
        run_id: Uuid,
        workflow: impl Into<String>,
        event: impl Into<String>,
        variants: Vec<VariantResult>,
    ) -> Self {
        let first_failure = variants.iter().find(|v| v.outcome == RunOutcome::Failure);

        let (outcome, error) = match first_failure {
            Some(failed) => (
                RunOutcome::Failure,
                Some(format!(
                    "{}: {}",
                    failed.label(),
                    failed.error.as_deref().unwrap_or("failed")
                )),
            ),
            None => (RunOutcome::Success, None),
        };

        let output = variants
            .iter()
            .filter(|v| !v.output.is_empty())
            .map(|v| format!("== {} ==\n{}", v.label(), v.output))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            run_id,
            workflow: workflow.into(),
            event: event.into(),
            outcome,
            timestamp: Utc::now(),
            error,
            variants,
            output,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    pub fn failed(&self) -> bool {
        self.outcome == RunOutcome::Failure
    }

    pub fn failed_variants(&self) -> impl Iterator<Item = &VariantResult> {
        self.variants
            .iter()
            .filter(|v| v.outcome == RunOutcome::Failure)
    }
}
