//! Docker CLI backend - drives `docker` as a subprocess

use crate::backend::{BackendError, ContainerBackend, ContainerHandle, CreateOptions, ExecCommand, ExecOutput};
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Backend that shells out to the docker CLI
#[derive(Debug, Clone)]
pub struct DockerBackend {
    /// Path to docker executable
    docker_path: String,

    /// Timeout for management commands (create, destroy, host queries)
    timeout_secs: u64,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new("docker".to_string(), 300)
    }
}

impl DockerBackend {
    /// Create a new docker backend
    ///
    /// # Arguments
    /// * `docker_path` - Path to docker executable (e.g., "docker", "/usr/bin/podman")
    /// * `timeout_secs` - Timeout for management commands in seconds
    pub fn new(docker_path: String, timeout_secs: u64) -> Self {
        Self {
            docker_path,
            timeout_secs,
        }
    }

    pub fn docker_path(&self) -> &str {
        &self.docker_path
    }

    /// Arguments for `docker run` that start an idle container
    fn run_args(image: &str, options: &CreateOptions) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];

        if !options.name.is_empty() {
            args.push("--name".to_string());
            args.push(options.name.clone());
        }
        for (key, value) in &options.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &options.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(dir) = &options.working_dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        args.push(image.to_string());
        args.push("sleep".to_string());
        args.push("infinity".to_string());
        args
    }

    /// Arguments for `docker exec`
    fn exec_args(container: &str, command: &ExecCommand) -> Vec<String> {
        let mut args = vec!["exec".to_string()];

        for (key, value) in &command.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(dir) = &command.working_dir {
            args.push("-w".to_string());
            args.push(dir.clone());
        }

        args.push(container.to_string());
        args.extend(command.argv.iter().cloned());
        args
    }

    /// Run a management command with the configured timeout
    async fn run(&self, args: &[String]) -> Result<Output, BackendError> {
        debug!("{} {}", self.docker_path, args.join(" "));

        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.docker_path)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.timeout_secs))?;

        result.map_err(|e| BackendError::Spawn {
            program: self.docker_path.clone(),
            message: e.to_string(),
        })
    }

    /// Run a management command and return its stdout, failing on non-zero exit
    async fn run_checked(&self, args: &[String]) -> Result<String, BackendError> {
        let output = self.run(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BackendError::CommandFailed {
                command: format!("docker {}", args.first().map(String::as_str).unwrap_or_default()),
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn create(&self, image: &str, options: &CreateOptions) -> Result<ContainerHandle, BackendError> {
        let args = Self::run_args(image, options);
        let stdout = self.run_checked(&args).await?;

        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(BackendError::Internal("docker run printed no container id".to_string()));
        }

        debug!("Created container {} ({}) from {}", options.name, id, image);
        Ok(ContainerHandle {
            id,
            name: options.name.clone(),
            image: image.to_string(),
        })
    }

    async fn exec(&self, handle: &ContainerHandle, command: &ExecCommand) -> Result<ExecOutput, BackendError> {
        let args = Self::exec_args(&handle.id, command);
        debug!("exec in {}: {}", handle.name, command.display());

        // Deadlines for exec are owned by the caller
        let output = Command::new(&self.docker_path)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Spawn {
                program: self.docker_path.clone(),
                message: e.to_string(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }

    async fn destroy(&self, handle: &ContainerHandle) -> Result<(), BackendError> {
        let args = strings(&["rm", "-f", handle.id.as_str()]);
        self.run_checked(&args).await?;
        debug!("Removed container {}", handle.name);
        Ok(())
    }

    async fn server_version(&self) -> Result<String, BackendError> {
        let args = strings(&["version", "--format", "{{.Server.Version}}"]);
        Ok(self.run_checked(&args).await?.trim().to_string())
    }

    async fn buildx_version(&self) -> Result<String, BackendError> {
        self.run_checked(&strings(&["buildx", "version"])).await
    }

    async fn buildx_builders(&self) -> Result<String, BackendError> {
        self.run_checked(&strings(&["buildx", "ls"])).await
    }
}
