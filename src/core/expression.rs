//! `${{ }}` expression substitution
//!
//! Supports single-level lookups of the form `namespace.key` only. Operators,
//! literals and function calls are not evaluated; any token that does not
//! resolve is left in the text exactly as written.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Source of values for expression lookups
pub trait ExpressionScope {
    /// Resolve `key` within `namespace` (e.g. `github`, `ref`)
    fn lookup(&self, namespace: &str, key: &str) -> Option<Cow<'_, str>>;
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([^}]*?)\s*\}\}").expect("expression pattern is valid")
    })
}

/// Substitute every resolvable `${{ namespace.key }}` token in `text`
pub fn expand(text: &str, scope: &dyn ExpressionScope) -> String {
    if !text.contains("${{") {
        return text.to_string();
    }

    token_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            let expr = caps[1].trim();
            match resolve(expr, scope) {
                Some(value) => value.into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Expressions referenced in `text`, in order of appearance
pub fn referenced_names(text: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// If `text` is exactly one `${{ ... }}` token, return its inner expression
pub fn unwrap_token(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("${{")?.strip_suffix("}}")?;
    if inner.contains("${{") {
        return None;
    }
    Some(inner.trim())
}

fn resolve<'a>(expr: &str, scope: &'a dyn ExpressionScope) -> Option<Cow<'a, str>> {
    let (namespace, key) = expr.split_once('.')?;
    if namespace.is_empty() || key.is_empty() {
        return None;
    }
    scope.lookup(namespace, key)
}
