//! Variable resolution and binding resolution
//!
//! Interpolates `$name$` placeholders against the export scope chain and
//! turns a node's [`QueryBinding`] into a fully resolved path + modifier
//! set with a canonical cache key.
//!
//! A single unresolvable placeholder nulls the entire string: a partially
//! substituted template is never produced. Missing optional filters are
//! therefore not errors; a numeric limit resolving to a non-number is.

use serde_json::Value;

use crate::query::QueryBinding;
use crate::store::Modifiers;

use super::errors::{EngineError, EngineResult};
use super::scope::Scope;
use super::value::Entry;

/// Sentinel for an absent modifier in the cache key
const ABSENT: &str = "-";

/// A binding with every placeholder substituted
#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    /// Fully resolved store path
    pub path: String,
    /// Fully resolved modifiers
    pub modifiers: Modifiers,
    /// Canonical key: path and every modifier joined in fixed order
    pub cache_key: String,
}

/// Interpolate `$name$` placeholders in `text` against the scope chain.
///
/// Returns the input unchanged when it carries no placeholder, the fully
/// substituted string when every name resolves, and `None` as soon as any
/// name fails to resolve to a scalar. The scan cursor advances past each
/// substituted value, so resolution always terminates even when a value
/// itself contains `$`.
pub fn resolve_template(text: &str, scope: &Scope) -> Option<String> {
    if !text.contains('$') {
        return Some(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find('$') else {
            out.push_str(rest);
            return Some(out);
        };
        let Some(len) = rest[start + 1..].find('$') else {
            // Unpaired delimiter: keep the remainder literally
            out.push_str(rest);
            return Some(out);
        };
        let end = start + 1 + len;
        let name = &rest[start + 1..end];

        let value = scope.lookup(name)?;
        let rendered = render_scalar(&value)?;

        out.push_str(&rest[..start]);
        out.push_str(&rendered);
        rest = &rest[end + 1..];
    }
}

/// Render a looked-up value for substitution; null and structured values
/// fail the whole template.
fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Resolve a range/equality modifier value; string values are templates.
/// `None` means the modifier dropped out (unresolvable placeholder).
fn resolve_filter_value(value: &Value, scope: &Scope) -> Option<Value> {
    match value {
        Value::String(s) => resolve_template(s, scope).map(Value::String),
        other => Some(other.clone()),
    }
}

/// Resolve a numeric limit modifier. A placeholder string may substitute
/// to a number; anything else of the wrong kind fails the branch.
fn resolve_limit(
    value: &Value,
    scope: &Scope,
    modifier: &'static str,
) -> EngineResult<Option<u64>> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(limit) => Ok(Some(limit)),
            None => Err(EngineError::InvalidModifier {
                modifier,
                detail: format!("expected a non-negative integer, got {}", n),
            }),
        },
        Value::String(s) => match resolve_template(s, scope) {
            None => Ok(None),
            Some(resolved) => match resolved.parse::<u64>() {
                Ok(limit) => Ok(Some(limit)),
                Err(_) => Err(EngineError::InvalidModifier {
                    modifier,
                    detail: format!("expected a number, got \"{}\"", resolved),
                }),
            },
        },
        other => Err(EngineError::InvalidModifier {
            modifier,
            detail: format!("expected a number, got {}", other),
        }),
    }
}

/// Resolve a node's binding against the scope chain.
///
/// `Ok(None)` means the path template nulled out: the node degrades to the
/// unbound derivation path instead of erroring.
pub fn resolve_binding(
    binding: &QueryBinding,
    scope: &Scope,
    parent: Option<&Entry>,
) -> EngineResult<Option<ResolvedBinding>> {
    let Some(mut path) = resolve_template(&binding.path, scope) else {
        return Ok(None);
    };

    if let Some(hook) = &binding.derive_subpath {
        let (key, value) = match parent {
            Some(entry) => (entry.key.as_deref(), &entry.value),
            None => (None, &Value::Null),
        };
        if let Some(subpath) = hook(key, value) {
            path = format!(
                "{}/{}",
                path.trim_end_matches('/'),
                subpath.trim_start_matches('/')
            );
        }
    }

    let order_by_field = match &binding.order_by_field {
        Some(field) => resolve_template(field, scope),
        None => None,
    };

    let limit_first = match &binding.limit_first {
        Some(value) => resolve_limit(value, scope, "limit_first")?,
        None => None,
    };
    let limit_last = match &binding.limit_last {
        Some(value) => resolve_limit(value, scope, "limit_last")?,
        None => None,
    };

    let range_start = binding
        .range_start
        .as_ref()
        .and_then(|v| resolve_filter_value(v, scope));
    let range_end = binding
        .range_end
        .as_ref()
        .and_then(|v| resolve_filter_value(v, scope));
    let equal_to = binding
        .equal_to
        .as_ref()
        .and_then(|v| resolve_filter_value(v, scope));

    let modifiers = Modifiers {
        order_by_field,
        order_by_key: binding.order_by_key,
        order_by_value: binding.order_by_value,
        limit_first,
        limit_last,
        range_start,
        range_end,
        equal_to,
    };

    let cache_key = build_cache_key(&path, &modifiers);

    Ok(Some(ResolvedBinding {
        path,
        modifiers,
        cache_key,
    }))
}

/// Join the resolved path and every modifier in fixed order; absent
/// modifiers are the `-` sentinel.
fn build_cache_key(path: &str, modifiers: &Modifiers) -> String {
    let render = |value: &Option<Value>| match value {
        Some(v) => v.to_string(),
        None => ABSENT.to_string(),
    };

    [
        path.to_string(),
        modifiers
            .order_by_field
            .clone()
            .unwrap_or_else(|| ABSENT.to_string()),
        if modifiers.order_by_key { "yes" } else { "no" }.to_string(),
        if modifiers.order_by_value { "yes" } else { "no" }.to_string(),
        modifiers
            .limit_first
            .map(|l| l.to_string())
            .unwrap_or_else(|| ABSENT.to_string()),
        modifiers
            .limit_last
            .map(|l| l.to_string())
            .unwrap_or_else(|| ABSENT.to_string()),
        render(&modifiers.range_start),
        render(&modifiers.range_end),
        render(&modifiers.equal_to),
    ]
    .join("$")
}
