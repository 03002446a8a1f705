//! Scenario-based tests for localci, driven by a scripted container backend

#[path = "../helpers.rs"]
mod helpers;

mod conditions;
mod matrix_variants;
mod timeouts;
mod triggers;
mod workflow_manager;
