//! Matrix expansion
//!
//! Turns `strategy.matrix` into concrete variable bindings, one per job
//! variant. Expansion is a Cartesian product in axis declaration order, so
//! running it twice on the same strategy yields the same sequence.

use crate::core::workflow::{scalar_to_string, Strategy};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use tracing::{debug, warn};

/// Matrix keys that describe adjustments rather than axes
const RESERVED_KEYS: &[&str] = &["include", "exclude"];

/// One concrete assignment of every matrix axis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixBinding(IndexMap<String, String>);

impl MatrixBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.0.get(axis).map(String::as_str)
    }

    pub fn insert(&mut self, axis: impl Into<String>, value: impl Into<String>) {
        self.0.insert(axis.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Short label such as `node=16, os=ubuntu`; empty for the unit binding
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(|(axis, value)| format!("{}={}", axis, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MatrixBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "(no matrix)")
        } else {
            write!(f, "{}", self.label())
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MatrixBinding {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Expand a job strategy into its bindings.
///
/// A missing strategy or matrix, and an empty matrix, all give exactly one
/// empty binding. An axis declared with an empty list gives no bindings.
pub fn expand(strategy: Option<&Strategy>) -> Vec<MatrixBinding> {
    let Some(strategy) = strategy else {
        return vec![MatrixBinding::new()];
    };

    if strategy.fail_fast.is_some() || strategy.max_parallel.is_some() {
        debug!(
            fail_fast = ?strategy.fail_fast,
            max_parallel = ?strategy.max_parallel,
            "strategy scheduling hints are advisory"
        );
    }

    let Some(matrix) = &strategy.matrix else {
        return vec![MatrixBinding::new()];
    };

    let axes = axes(matrix);
    cartesian_product(&axes)
}

fn axes(matrix: &IndexMap<String, Value>) -> Vec<(String, Vec<String>)> {
    let mut axes = Vec::with_capacity(matrix.len());

    for (name, value) in matrix {
        if RESERVED_KEYS.contains(&name.as_str()) {
            warn!("matrix '{}' entries are not supported and will be ignored", name);
            continue;
        }

        let values = match value {
            Value::Sequence(items) => items.iter().map(scalar_to_string).collect::<Vec<_>>(),
            other => vec![scalar_to_string(other)],
        };

        if values.is_empty() {
            warn!("matrix axis '{}' has no values; no variants will run", name);
        }

        axes.push((name.clone(), values));
    }

    axes
}

fn cartesian_product(axes: &[(String, Vec<String>)]) -> Vec<MatrixBinding> {
    let mut bindings = vec![MatrixBinding::new()];

    for (axis, values) in axes {
        let mut next = Vec::with_capacity(bindings.len() * values.len());
        for binding in &bindings {
            for value in values {
                let mut extended = binding.clone();
                extended.insert(axis.clone(), value.clone());
                next.push(extended);
            }
        }
        bindings = next;
    }

    bindings
}
