//! Run-state tracking for workflow executions
//!
//! State lives in memory for the life of the process. The tracker is shared
//! by `Arc` and handed to the engine explicitly.

use crate::core::{RunOutcome, RunResult, VariantResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Last known status of a workflow or variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Never recorded
    Unknown,
    Running,
    Success,
    Failure,
    Skipped,
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => RunStatus::Success,
            RunOutcome::Failure => RunStatus::Failure,
            RunOutcome::Skipped => RunStatus::Skipped,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::Unknown => "unknown",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// One tracked entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub workflow: String,
    /// Set for per-variant records
    pub job: Option<String>,
    /// Binding label, empty when the job has no matrix
    pub binding: Option<String>,
    pub status: RunStatus,
    pub detail: Option<String>,
    pub run_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

type VariantKey = (String, String, String);

/// In-memory tracker keyed by workflow name, plus per-variant entries
pub struct RunStateTracker {
    workflows: RwLock<HashMap<String, RunRecord>>,
    variants: RwLock<HashMap<VariantKey, RunRecord>>,
}

impl RunStateTracker {
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            variants: RwLock::new(HashMap::new()),
        }
    }

    /// Mark a workflow as started
    pub async fn mark_running(&self, workflow: &str, run_id: Uuid) {
        let record = RunRecord {
            workflow: workflow.to_string(),
            job: None,
            binding: None,
            status: RunStatus::Running,
            detail: None,
            run_id: Some(run_id),
            updated_at: Utc::now(),
        };
        self.workflows.write().await.insert(workflow.to_string(), record);
    }

    /// Record the status of a workflow. The last write wins.
    pub async fn record_outcome(&self, workflow: &str, status: RunStatus, detail: Option<String>) {
        let mut workflows = self.workflows.write().await;
        let run_id = workflows.get(workflow).and_then(|r| r.run_id);
        workflows.insert(
            workflow.to_string(),
            RunRecord {
                workflow: workflow.to_string(),
                job: None,
                binding: None,
                status,
                detail,
                run_id,
                updated_at: Utc::now(),
            },
        );
    }

    /// Record a finished run and every variant in it
    pub async fn record_run(&self, result: &RunResult) {
        for variant in &result.variants {
            self.record_variant(&result.workflow, variant).await;
        }

        let mut workflows = self.workflows.write().await;
        workflows.insert(
            result.workflow.clone(),
            RunRecord {
                workflow: result.workflow.clone(),
                job: None,
                binding: None,
                status: result.outcome.into(),
                detail: result.error.clone(),
                run_id: Some(result.run_id),
                updated_at: result.timestamp,
            },
        );
    }

    pub async fn record_variant(&self, workflow: &str, variant: &VariantResult) {
        let binding = variant.binding.label();
        let key = (workflow.to_string(), variant.job_id.clone(), binding.clone());
        let record = RunRecord {
            workflow: workflow.to_string(),
            job: Some(variant.job_id.clone()),
            binding: Some(binding),
            status: variant.outcome.into(),
            detail: variant.error.clone(),
            run_id: None,
            updated_at: variant.completed_at,
        };
        self.variants.write().await.insert(key, record);
    }

    /// Status of a workflow, `Unknown` if never recorded
    pub async fn query(&self, workflow: &str) -> RunStatus {
        self.workflows
            .read()
            .await
            .get(workflow)
            .map(|r| r.status)
            .unwrap_or(RunStatus::Unknown)
    }

    /// Status of one variant. `binding` is the binding label, e.g. `os=a, node=1`.
    pub async fn query_variant(&self, workflow: &str, job: &str, binding: &str) -> RunStatus {
        let key = (workflow.to_string(), job.to_string(), binding.to_string());
        self.variants
            .read()
            .await
            .get(&key)
            .map(|r| r.status)
            .unwrap_or(RunStatus::Unknown)
    }

    pub async fn detail(&self, workflow: &str) -> Option<String> {
        self.workflows
            .read()
            .await
            .get(workflow)
            .and_then(|r| r.detail.clone())
    }

    /// Every workflow-level record, sorted by workflow name
    pub async fn snapshot(&self) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> = self.workflows.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.workflow.cmp(&b.workflow));
        records
    }

    /// Every per-variant record, sorted by workflow, job and binding
    pub async fn variant_snapshot(&self) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> = self.variants.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            (&a.workflow, &a.job, &a.binding).cmp(&(&b.workflow, &b.job, &b.binding))
        });
        records
    }
}

impl Default for RunStateTracker {
    fn default() -> Self {
        Self::new()
    }
}
