//! Workflow execution engine

pub mod actions;
pub mod engine;
pub mod executor;
pub mod scheduler;

pub use actions::{ActionDispatcher, ActionError, ActionHandler, ActionOutcome};
pub use engine::{EventEmitter, ExecutionEvent, WorkflowEngine};
pub use executor::{JobExecutor, StepError, VariantPlan};
pub use scheduler::{SchedulingStrategy, VariantScheduler};
