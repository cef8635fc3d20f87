//! Value comparison shared by the evaluator and the sorter

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

/// Parses an ISO-8601 timestamp or calendar date into epoch milliseconds
pub fn date_millis(s: &str) -> Option<i64> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Some(timestamp.timestamp_millis());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp_millis())
}

/// Equality with numeric normalization (`1` equals `1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Orders two scalars of the same kind. Returns `None` when they are not
/// comparable (different kinds, arrays, objects).
pub fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (date_millis(x), date_millis(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Case-insensitive ordering with a byte-order tie break.
///
/// This approximates locale collation: strings are compared by Unicode
/// lowercase code points, so accented letters (`é`) sort after `z` rather
/// than next to their base letter.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Renders a value for the mixed-type string fallback
pub fn sort_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
