//! Per-variant execution context
//!
//! Holds everything a `${{ }}` expression may refer to while one job variant
//! runs. A context is built for each variant and never shared.

use crate::core::expression::ExpressionScope;
use crate::core::matrix::MatrixBinding;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// Mask substituted for secret values in captured output
pub const SECRET_MASK: &str = "***";

/// The `github.*` namespace. Values are fixed stand-ins for a real checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubContext {
    pub event_name: String,
    pub workflow: String,
    pub job: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
    pub actor: String,
    pub workspace: String,
    pub run_id: String,
    pub run_number: String,
}

impl GithubContext {
    pub fn new(workflow: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            workflow: workflow.into(),
            job: String::new(),
            repository: "test/repo".to_string(),
            git_ref: "refs/heads/main".to_string(),
            sha: "abcd1234".to_string(),
            actor: "test-user".to_string(),
            workspace: "/github/workspace".to_string(),
            run_id: "123456789".to_string(),
            run_number: "1".to_string(),
        }
    }

    /// Look up a field by its expression name
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "event_name" => &self.event_name,
            "workflow" => &self.workflow,
            "job" => &self.job,
            "repository" => &self.repository,
            "ref" => &self.git_ref,
            "sha" => &self.sha,
            "actor" => &self.actor,
            "workspace" => &self.workspace,
            "run_id" => &self.run_id,
            "run_number" => &self.run_number,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// All fields as (expression name, value) pairs
    pub fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("event_name", self.event_name.as_str()),
            ("workflow", self.workflow.as_str()),
            ("job", self.job.as_str()),
            ("repository", self.repository.as_str()),
            ("ref", self.git_ref.as_str()),
            ("sha", self.sha.as_str()),
            ("actor", self.actor.as_str()),
            ("workspace", self.workspace.as_str()),
            ("run_id", self.run_id.as_str()),
            ("run_number", self.run_number.as_str()),
        ]
    }
}

/// Context for one job variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub github: GithubContext,

    /// Active matrix binding
    pub matrix: MatrixBinding,

    /// Accumulated environment: workflow, then caller overrides, then job
    pub env: IndexMap<String, String>,

    /// Secret values, masked in any captured output
    #[serde(skip_serializing, default)]
    pub secrets: IndexMap<String, String>,

    /// Outputs recorded by steps, keyed by step id
    pub step_outputs: HashMap<String, IndexMap<String, String>>,
}

impl ExecutionContext {
    pub fn new(workflow: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            github: GithubContext::new(workflow, event_name),
            matrix: MatrixBinding::new(),
            env: IndexMap::new(),
            secrets: IndexMap::new(),
            step_outputs: HashMap::new(),
        }
    }

    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.github.job = job.into();
        self
    }

    pub fn with_matrix(mut self, binding: MatrixBinding) -> Self {
        self.matrix = binding;
        self
    }

    pub fn with_secrets(mut self, secrets: IndexMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Layer `vars` over the accumulated environment
    pub fn merge_env<'a, I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
    }

    /// Record an output value for a step
    pub fn set_step_output(&mut self, step_id: &str, name: &str, value: String) {
        self.step_outputs
            .entry(step_id.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn step_output(&self, step_id: &str, name: &str) -> Option<&str> {
        self.step_outputs
            .get(step_id)
            .and_then(|outputs| outputs.get(name))
            .map(String::as_str)
    }

    /// Environment handed to the container at creation.
    ///
    /// Contains the accumulated env, `GITHUB_<FIELD>` for every github field,
    /// `MATRIX_<AXIS>` for every binding entry, and the secrets.
    pub fn container_env(&self) -> IndexMap<String, String> {
        let mut vars = self.env.clone();

        for (field, value) in self.github.fields() {
            vars.insert(format!("GITHUB_{}", field.to_ascii_uppercase()), value.to_string());
        }

        for (axis, value) in self.matrix.iter() {
            vars.insert(env_key("MATRIX_", axis), value.clone());
        }

        for (name, value) in &self.secrets {
            vars.insert(name.clone(), value.clone());
        }

        vars
    }

    /// Replace every secret value in `text` with [`SECRET_MASK`]
    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for value in self.secrets.values() {
            if !value.is_empty() {
                masked = masked.replace(value.as_str(), SECRET_MASK);
            }
        }
        masked
    }
}

fn env_key(prefix: &str, name: &str) -> String {
    let normalised: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", prefix, normalised)
}

impl ExpressionScope for ExecutionContext {
    fn lookup(&self, namespace: &str, key: &str) -> Option<Cow<'_, str>> {
        match namespace {
            "github" => self.github.get(key).map(Cow::Borrowed),
            "matrix" => self.matrix.get(key).map(Cow::Borrowed),
            "env" => self.env.get(key).map(|v| Cow::Borrowed(v.as_str())),
            "secrets" => self.secrets.get(key).map(|v| Cow::Borrowed(v.as_str())),
            "steps" => {
                // steps.<id>.outputs.<name>
                let (step_id, rest) = key.split_once('.')?;
                let name = rest.strip_prefix("outputs.")?;
                self.step_output(step_id, name).map(Cow::Borrowed)
            }
            _ => None,
        }
    }
}
