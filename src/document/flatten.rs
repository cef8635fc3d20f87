//! Flatten/unflatten between nested documents and arrow-keyed records

use serde_json::Value;

use super::path::set_record_path;
use super::Record;
use crate::query::NESTED_SEPARATOR;

/// Flattens nested objects into arrow-keyed fields. Arrays and empty
/// objects are kept as leaves.
pub fn flatten_record(record: &Record) -> Record {
    let mut flat = Record::new();
    for (key, value) in record {
        flatten_into(&mut flat, key.clone(), value);
    }
    flat
}

fn flatten_into(flat: &mut Record, prefix: String, value: &Value) {
    match value {
        Value::Object(obj) if !obj.is_empty() => {
            for (key, nested) in obj {
                flatten_into(flat, format!("{}{}{}", prefix, NESTED_SEPARATOR, key), nested);
            }
        }
        leaf => {
            flat.insert(prefix, leaf.clone());
        }
    }
}

/// Rebuilds nested objects from arrow-keyed fields
pub fn unflatten_record(record: &Record) -> Record {
    let mut nested = Record::new();
    for (key, value) in record {
        set_record_path(&mut nested, key, value.clone());
    }
    nested
}
