//! Trigger matching
//!
//! Decides whether a workflow runs for an event. Only the presence of the
//! event in the `on:` declaration matters; branch, path and type filters
//! under a mapping entry are not evaluated.

use crate::core::workflow::{Trigger, Workflow};

/// Events reported by the `events` command. Informational only.
pub const KNOWN_EVENTS: &[&str] = &[
    "push",
    "pull_request",
    "workflow_dispatch",
    "schedule",
    "release",
    "issues",
    "pull_request_review",
];

/// Events exercised by `localci test` when none are given
pub const DEFAULT_TEST_EVENTS: &[&str] = &["push", "pull_request", "workflow_dispatch"];

/// Check whether `workflow` declares `event` as a trigger
pub fn should_run(workflow: &Workflow, event: &str) -> bool {
    match &workflow.on {
        None => false,
        Some(Trigger::Event(name)) => name == event,
        Some(Trigger::Events(names)) => names.iter().any(|name| name == event),
        Some(Trigger::Filters(filters)) => filters.contains_key(event),
    }
}

/// Events declared by the workflow, in declaration order
pub fn declared_events(workflow: &Workflow) -> Vec<String> {
    match &workflow.on {
        None => Vec::new(),
        Some(Trigger::Event(name)) => vec![name.clone()],
        Some(Trigger::Events(names)) => names.clone(),
        Some(Trigger::Filters(filters)) => filters.keys().cloned().collect(),
    }
}

/// Detail recorded when a workflow is skipped for an event
pub fn skip_reason(event: &str) -> String {
    format!("workflow does not run for event: {}", event)
}
