//! Container backends that job variants run in

pub mod docker;
pub mod error;
pub mod probe;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use docker::DockerBackend;
pub use error::BackendError;
pub use probe::{BuildxInfo, CapabilityProber};

/// A container created by a backend and owned by one job variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Backend id (for docker, the container id printed by `docker run -d`)
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Options for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: String,
    pub env: IndexMap<String, String>,
    pub working_dir: Option<String>,
    pub labels: IndexMap<String, String>,
}

/// A command to run inside an existing container
#[derive(Debug, Clone, Default)]
pub struct ExecCommand {
    pub argv: Vec<String>,
    pub env: IndexMap<String, String>,
    pub working_dir: Option<String>,
}

impl ExecCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// `sh -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(["sh".to_string(), "-c".to_string(), script.into()])
    }

    pub fn with_env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Command text for logs
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Result of an exec: exit code and combined stdout/stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub output: String,
}

impl ExecOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `lines` non-empty lines of output
    pub fn tail(&self, lines: usize) -> String {
        let kept: Vec<&str> = self
            .output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = kept.len().saturating_sub(lines);
        kept[start..].join("\n")
    }
}

/// Interface to whatever runs containers.
///
/// Implementations perform no retries. Host queries return the raw text the
/// backend reports; interpretation is left to [`CapabilityProber`].
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Start a long-lived container from `image`
    async fn create(&self, image: &str, options: &CreateOptions) -> Result<ContainerHandle, BackendError>;

    /// Run a command in the container. A non-zero exit is not an error.
    async fn exec(&self, handle: &ContainerHandle, command: &ExecCommand) -> Result<ExecOutput, BackendError>;

    /// Stop and remove the container
    async fn destroy(&self, handle: &ContainerHandle) -> Result<(), BackendError>;

    /// Server version string
    async fn server_version(&self) -> Result<String, BackendError>;

    /// Raw `buildx version` output
    async fn buildx_version(&self) -> Result<String, BackendError>;

    /// Raw `buildx ls` output, header line included
    async fn buildx_builders(&self) -> Result<String, BackendError>;
}
