//! Dot-delimited watch paths.
//!
//! `"a.b.c"` resolves to `data.a.b.c` on the owning scope's root data.
//! Only plain segments are accepted: no brackets, spaces or operators. A
//! missing segment resolves to `Null` rather than failing.

use std::sync::Arc;

use super::Value;
use crate::error::BoxError;
use crate::reactive::Getter;
use crate::scope::Scope;

/// Split a path into segments, or `None` if it contains characters other
/// than letters, digits, `.`, `_` and `$`.
pub fn parse_path(path: &str) -> Option<Vec<String>> {
    if path
        .chars()
        .any(|c| !(c.is_alphanumeric() || matches!(c, '.' | '_' | '$')))
    {
        return None;
    }
    Some(path.split('.').map(str::to_string).collect())
}

/// Build a getter that walks `segments` from the scope's root data.
pub fn getter(segments: Vec<String>) -> Getter {
    shared(move |scope| {
        let mut current = match scope.data() {
            Some(data) => Value::Object(data.clone()),
            None => return Ok(Value::Null),
        };
        for segment in &segments {
            current = resolve(&current, segment);
            if matches!(current, Value::Null) {
                break;
            }
        }
        Ok(current)
    })
}

/// Getter used in place of an unparsable path.
pub fn noop() -> Getter {
    shared(|_| Ok(Value::Null))
}

fn shared<F>(getter: F) -> Getter
where
    F: Fn(&Scope) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(getter)
}

fn resolve(value: &Value, segment: &str) -> Value {
    match value {
        Value::Object(obj) => obj.get(segment).unwrap_or_default(),
        Value::Array(arr) if segment == "length" => Value::from(arr.len()),
        Value::Array(arr) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| arr.get(index))
            .unwrap_or_default(),
        _ => Value::Null,
    }
}
