//! Step and job `if:` conditions
//!
//! Only a handful of literal tokens are understood. Anything else runs, so a
//! condition this engine cannot parse never hides work; a warning is logged.

use crate::core::expression::{self, ExpressionScope};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Result of evaluating a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOutcome {
    Run,
    Skip,
}

impl ConditionOutcome {
    pub fn should_run(self) -> bool {
        matches!(self, ConditionOutcome::Run)
    }
}

/// Evaluate an optional condition. A missing condition always runs.
pub fn evaluate(condition: Option<&str>, scope: &dyn ExpressionScope) -> ConditionOutcome {
    let Some(raw) = condition else {
        return ConditionOutcome::Run;
    };

    let expanded = expression::expand(raw, scope);
    let token = expression::unwrap_token(&expanded)
        .unwrap_or(expanded.as_str())
        .trim()
        .to_ascii_lowercase();

    match token.as_str() {
        "" | "true" | "success()" | "always()" => ConditionOutcome::Run,
        "false" | "failure()" => ConditionOutcome::Skip,
        _ => {
            warn!(
                "unsupported condition '{}', running anyway",
                raw.trim()
            );
            ConditionOutcome::Run
        }
    }
}
