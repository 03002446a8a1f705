//! Core domain models for localci
//!
//! This module defines the workflow model and the pure logic that runs over
//! it: trigger matching, matrix expansion, expressions and conditions.

pub mod condition;
pub mod context;
pub mod expression;
pub mod matrix;
pub mod state;
pub mod trigger;
pub mod workflow;

pub use condition::ConditionOutcome;
pub use context::ExecutionContext;
pub use matrix::MatrixBinding;
pub use state::*;
pub use workflow::*;
