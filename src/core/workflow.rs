//! Workflow definition loaded from YAML

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a workflow definition.
///
/// These are the only errors that stop a run before anything executes.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow file not found: {0} (.yml or .yaml)")]
    NotFound(String),

    #[error("failed to read workflow file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid workflow: {0}")]
    Invalid(String),
}

/// Top-level workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name (optional, falls back to the file name)
    #[serde(default)]
    pub name: Option<String>,

    /// Trigger declaration
    #[serde(default)]
    pub on: Option<Trigger>,

    /// Jobs keyed by job id, in declaration order
    #[serde(default)]
    pub jobs: IndexMap<String, Job>,

    /// Default environment for every job
    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,
}

/// The `on:` declaration in one of its three shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    /// `on: push`
    Event(String),
    /// `on: [push, pull_request]`
    Events(Vec<String>),
    /// `on: { push: { branches: [main] } }`
    Filters(IndexMap<String, Value>),
}

/// `runs-on:` label(s)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunsOn {
    Label(String),
    Labels(Vec<String>),
}

impl RunsOn {
    /// The label used for image selection
    pub fn primary(&self) -> Option<&str> {
        match self {
            RunsOn::Label(label) => Some(label.as_str()),
            RunsOn::Labels(labels) => labels.first().map(String::as_str),
        }
    }
}

/// `needs:` as a single job or a list of jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Needs {
    One(String),
    Many(Vec<String>),
}

impl Needs {
    pub fn jobs(&self) -> Vec<&str> {
        match self {
            Needs::One(job) => vec![job.as_str()],
            Needs::Many(jobs) => jobs.iter().map(String::as_str).collect(),
        }
    }
}

/// A job in the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Target runner label(s)
    #[serde(default)]
    pub runs_on: Option<RunsOn>,

    /// Matrix strategy
    #[serde(default)]
    pub strategy: Option<Strategy>,

    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Job-level environment
    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,

    /// Job condition
    #[serde(default, rename = "if", deserialize_with = "optional_scalar")]
    pub condition: Option<String>,

    /// Declared dependencies (informational)
    #[serde(default)]
    pub needs: Option<Needs>,

    /// Sidecar services (informational)
    #[serde(default)]
    pub services: IndexMap<String, Service>,

    /// Job container declaration (not supported, kept for round-tripping)
    #[serde(default)]
    pub container: Option<Value>,

    /// Timeout for each variant of this job
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

impl Job {
    /// Job display name, falling back to its id
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }
}

/// Job strategy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Strategy {
    /// Axis name -> values. `None` when the key is absent.
    #[serde(default)]
    pub matrix: Option<IndexMap<String, Value>>,

    #[serde(default)]
    pub fail_fast: Option<bool>,

    #[serde(default)]
    pub max_parallel: Option<usize>,
}

/// A single step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Step {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Action reference, e.g. `actions/checkout@v4`
    #[serde(default)]
    pub uses: Option<String>,

    /// Inline shell script
    #[serde(default)]
    pub run: Option<String>,

    /// Action parameters
    #[serde(default)]
    pub with: IndexMap<String, Value>,

    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,

    #[serde(default, rename = "if", deserialize_with = "optional_scalar")]
    pub condition: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

impl Step {
    /// Human-readable label used in logs and failure details.
    ///
    /// `index` is zero-based.
    pub fn display_name(&self, index: usize) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(id) = &self.id {
            return id.clone();
        }
        if let Some(uses) = &self.uses {
            return uses.clone();
        }
        if let Some(run) = &self.run {
            if let Some(line) = run.lines().find(|l| !l.trim().is_empty()) {
                return line.trim().to_string();
            }
        }
        format!("step {}", index + 1)
    }
}

/// Service container declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub image: String,

    #[serde(default, deserialize_with = "string_map")]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub ports: Vec<Value>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub options: Option<String>,

    #[serde(default, deserialize_with = "string_map")]
    pub credentials: IndexMap<String, String>,
}

impl Workflow {
    /// Load a workflow from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a workflow from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkflowError> {
        let workflow: Workflow = serde_yaml::from_str(yaml)?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.jobs.is_empty() {
            return Err(WorkflowError::Invalid("workflow declares no jobs".to_string()));
        }

        for (job_id, job) in &self.jobs {
            let mut seen_ids = HashSet::new();
            for (index, step) in job.steps.iter().enumerate() {
                if step.run.is_some() && step.uses.is_some() {
                    return Err(WorkflowError::Invalid(format!(
                        "job '{}' step {} sets both 'run' and 'uses'",
                        job_id,
                        index + 1
                    )));
                }
                if let Some(id) = &step.id {
                    if !seen_ids.insert(id.as_str()) {
                        return Err(WorkflowError::Invalid(format!(
                            "job '{}' has duplicate step id '{}'",
                            job_id, id
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Workflow name, or `fallback` (usually the file stem) when unnamed
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }
}

/// Render a YAML scalar the way it would appear in a shell environment.
///
/// Sequences and mappings fall back to their compact YAML text.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn string_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(&value)))
        .collect())
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.is_null()).map(|v| scalar_to_string(&v)))
}
