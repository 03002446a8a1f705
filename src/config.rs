//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Image used for every `runs-on` label
pub const DEFAULT_IMAGE: &str = "ubuntu:22.04";

/// Workspace path inside the container
pub const CONTAINER_WORKSPACE: &str = "/github/workspace";

/// Home directory created inside the container
pub const CONTAINER_HOME: &str = "/github/home";

/// Configuration for running workflows
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Image used when a `runs-on` label has no better mapping
    pub default_image: String,

    /// Deadline for each job variant, in seconds
    pub run_timeout_secs: u64,

    /// Path to the docker executable
    pub docker_path: String,

    /// Platform directory name; workflows live in `.<platform>/workflows`
    pub platform: String,

    /// Install git/curl/wget/unzip into each fresh container
    pub bootstrap_tools: bool,

    /// Project directory that holds the platform directory
    pub workspace: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_image: DEFAULT_IMAGE.to_string(),
            run_timeout_secs: 600,
            docker_path: "docker".to_string(),
            platform: "github".to_string(),
            bootstrap_tools: true,
            workspace: PathBuf::from("."),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    pub fn with_run_timeout(mut self, timeout_secs: u64) -> Self {
        self.run_timeout_secs = timeout_secs;
        self
    }

    /// Run timeout given in minutes, as `--timeout-minutes` takes it
    pub fn with_timeout_minutes(self, minutes: u64) -> Self {
        self.with_run_timeout(minutes.saturating_mul(60))
    }

    pub fn with_docker_path(mut self, path: impl Into<String>) -> Self {
        self.docker_path = path.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_bootstrap_tools(mut self, enabled: bool) -> Self {
        self.bootstrap_tools = enabled;
        self
    }

    pub fn with_workspace<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.workspace = path.as_ref().to_path_buf();
        self
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// `<workspace>/.<platform>/workflows`
    pub fn workflows_dir(&self) -> PathBuf {
        self.workspace
            .join(format!(".{}", self.platform))
            .join("workflows")
    }

    /// Image for a `runs-on` label.
    ///
    /// Every label resolves to the default image; the ubuntu, macos and
    /// windows families are recognised only so they are not reported as
    /// unknown.
    pub fn image_for(&self, label: Option<&str>) -> &str {
        if let Some(label) = label {
            let known = ["ubuntu", "macos", "windows"]
                .iter()
                .any(|family| label.contains(family));
            if !known {
                tracing::debug!("runs-on '{}' has no image mapping, using {}", label, self.default_image);
            }
        }
        &self.default_image
    }
}
