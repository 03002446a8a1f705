//! Workflow discovery and the high-level manager used by the CLI

use crate::{
    backend::ContainerBackend,
    core::{RunResult, Workflow, WorkflowError},
    execution::WorkflowEngine,
    persistence::RunStatus,
};
use std::path::{Path, PathBuf};
use tracing::debug;

const EXTENSIONS: &[&str] = &["yml", "yaml"];

fn has_workflow_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

/// Workflow files directly under `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, WorkflowError> {
    if !dir.is_dir() {
        debug!("No workflow directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|source| WorkflowError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| WorkflowError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && has_workflow_extension(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Resolve a workflow name to a file in `dir`, preferring `.yml` over `.yaml`.
///
/// A name that already carries one of the extensions is used as given.
pub fn resolve(dir: &Path, name: &str) -> Result<PathBuf, WorkflowError> {
    let given = dir.join(name);
    if has_workflow_extension(&given) {
        if given.is_file() {
            return Ok(given);
        }
        return Err(WorkflowError::NotFound(name.to_string()));
    }

    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
}

/// Name a workflow is tracked by: its file name without extension
pub fn workflow_key(name: &str) -> String {
    let path = Path::new(name);
    if has_workflow_extension(path) {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(name)
            .to_string()
    } else {
        name.to_string()
    }
}

/// Resolves, loads and runs workflows by name
pub struct WorkflowManager<B: ContainerBackend + 'static> {
    engine: WorkflowEngine<B>,
}

impl<B: ContainerBackend + 'static> WorkflowManager<B> {
    pub fn new(engine: WorkflowEngine<B>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &WorkflowEngine<B> {
        &self.engine
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.engine.config().workflows_dir()
    }

    /// Discovered workflow files
    pub fn list(&self) -> Result<Vec<PathBuf>, WorkflowError> {
        discover(&self.workflows_dir())
    }

    /// Names of discovered workflows (file stems)
    pub fn names(&self) -> Result<Vec<String>, WorkflowError> {
        Ok(self
            .list()?
            .iter()
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    pub fn workflow_exists(&self, name: &str) -> bool {
        resolve(&self.workflows_dir(), name).is_ok()
    }

    pub fn load(&self, name: &str) -> Result<Workflow, WorkflowError> {
        let path = resolve(&self.workflows_dir(), name)?;
        debug!("Loading workflow {} from {}", name, path.display());
        Workflow::from_file(path)
    }

    /// Load and run a workflow. Only definition errors are returned as `Err`.
    pub async fn run(&self, name: &str, event: &str) -> Result<RunResult, WorkflowError> {
        let workflow = self.load(name)?;
        Ok(self.engine.run(&workflow, &workflow_key(name), event).await)
    }

    pub async fn last_status(&self, name: &str) -> RunStatus {
        self.engine.tracker().query(&workflow_key(name)).await
    }

    pub async fn last_run_succeeded(&self, name: &str) -> bool {
        self.last_status(name).await == RunStatus::Success
    }

    pub async fn last_run_failed(&self, name: &str) -> bool {
        self.last_status(name).await == RunStatus::Failure
    }
}
