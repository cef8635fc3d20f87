//! Arrow-path access into JSON documents

use serde_json::{Map, Value};

use super::Record;
use crate::query::NESTED_SEPARATOR;

/// Splits a field name into its nested segments
pub fn split_path(field: &str) -> Vec<&str> {
    field.split(NESTED_SEPARATOR).collect()
}

/// Resolves a nested field inside a JSON value
pub fn get_path<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    split_path(field)
        .into_iter()
        .try_fold(document, |current, segment| current.get(segment))
}

/// Resolves a nested field inside a record
pub fn get_record_path<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    let mut segments = split_path(field).into_iter();
    let first = segments.next()?;
    segments.try_fold(record.get(first)?, |current, segment| current.get(segment))
}

/// Writes a nested field, creating intermediate objects as needed.
///
/// A non-object value sitting on an intermediate segment is replaced.
pub fn set_record_path(record: &mut Record, field: &str, value: Value) {
    let segments = split_path(field);
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = record;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(obj) => obj,
            None => return,
        };
    }

    current.insert(last.to_string(), value);
}

/// Removes a nested field, returning its value
pub fn remove_record_path(record: &mut Record, field: &str) -> Option<Value> {
    let segments = split_path(field);
    let (last, parents) = segments.split_last()?;

    let mut current = record;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    current.remove(*last)
}

/// Returns the top-level property a field name lives under
pub fn top_level(field: &str) -> &str {
    field.split(NESTED_SEPARATOR).next().unwrap_or(field)
}

/// Keeps only the top-level properties a projection refers to
pub fn project_record(record: Record, projection: Option<&[String]>) -> Record {
    match projection {
        Some(fields) if !fields.is_empty() => record
            .into_iter()
            .filter(|(key, _)| fields.iter().any(|field| top_level(field) == key.as_str()))
            .collect(),
        _ => record,
    }
}
