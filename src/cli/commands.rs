//! CLI command definitions

use clap::Args;
use crate::execution::SchedulingStrategy;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Workflow name (file name under the workflows directory, extension optional)
    pub workflow: String,

    /// Event to simulate
    #[arg(short, long, default_value = "push")]
    pub event: String,

    /// Environment overrides (key=value)
    #[arg(long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Secrets (key=value), masked in output
    #[arg(long = "secret", value_parser = parse_key_value)]
    pub secrets: Vec<(String, String)>,

    /// How the variants of a job are scheduled
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Sequential)]
    pub strategy: SchedulingStrategyArg,

    /// Concurrency limit for `--strategy parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Deadline for each job variant, in minutes
    #[arg(long)]
    pub timeout_minutes: Option<u64>,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,
}

/// List discovered workflow files
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List events a workflow can be run for
#[derive(Debug, Args, Clone)]
pub struct EventsCommand {
    /// Workflow name
    pub workflow: String,

    /// Only the events the workflow declares under `on:`
    #[arg(long)]
    pub declared: bool,
}

/// List the jobs of a workflow
#[derive(Debug, Args, Clone)]
pub struct JobsCommand {
    /// Workflow name
    pub workflow: String,

    /// Event the jobs would run for
    pub event: String,
}

/// Check docker and buildx capabilities
#[derive(Debug, Args, Clone)]
pub struct DoctorCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Run every discovered workflow for a set of events
#[derive(Debug, Args, Clone)]
pub struct TestCommand {
    /// Events to run (repeatable). Defaults to push, pull_request and workflow_dispatch.
    #[arg(short, long = "event")]
    pub events: Vec<String>,

    /// Run workflows one after another instead of concurrently
    #[arg(long)]
    pub sequential: bool,

    /// Deadline for each job variant, in minutes
    #[arg(long)]
    pub timeout_minutes: Option<u64>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn into_strategy(self, max_parallel: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(max_parallel),
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
