//! Command-line interface

pub mod commands;
pub mod output;

use crate::config::RunnerConfig;
use clap::{Parser, Subcommand};
use commands::{DoctorCommand, EventsCommand, JobsCommand, ListCommand, RunCommand, TestCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Run GitHub Actions style workflows locally
#[derive(Debug, Parser, Clone)]
#[command(name = "localci")]
#[command(version)]
#[command(about = "Run GitHub Actions style workflows locally in disposable containers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory containing the workflows
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Path to the docker executable
    #[arg(long, global = true, default_value = "docker")]
    pub docker: String,

    /// Platform directory name; workflows are read from `.<platform>/workflows`
    #[arg(long, global = true, default_value = "github")]
    pub platform: String,

    /// Skip installing git/curl/wget/unzip into fresh containers
    #[arg(long, global = true)]
    pub no_bootstrap_tools: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow
    Run(RunCommand),

    /// List available workflows
    List(ListCommand),

    /// List events for a workflow
    Events(EventsCommand),

    /// List jobs for a workflow and event
    Jobs(JobsCommand),

    /// Check docker and buildx capabilities
    Doctor(DoctorCommand),

    /// Run every workflow for a set of events
    Test(TestCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Runner configuration from the global flags
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new()
            .with_workspace(&self.dir)
            .with_docker_path(self.docker.clone())
            .with_platform(self.platform.clone())
            .with_bootstrap_tools(!self.no_bootstrap_tools)
    }
}
