//! localci - Run GitHub Actions style workflows locally in containers

pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod execution;
pub mod exit_codes;
pub mod logging;
pub mod persistence;
pub mod workspace;

// Re-export commonly used types
pub use backend::{BackendError, CapabilityProber, ContainerBackend, DockerBackend};
pub use config::RunnerConfig;
pub use core::{ExecutionContext, MatrixBinding, RunOutcome, RunResult, VariantResult, Workflow, WorkflowError};
pub use execution::{ActionDispatcher, ExecutionEvent, SchedulingStrategy, WorkflowEngine};
pub use persistence::{RunStateTracker, RunStatus};
pub use workspace::WorkflowManager;
