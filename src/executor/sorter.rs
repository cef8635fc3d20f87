//! Result sorting for in-memory records
//!
//! Multi-key, stable. Missing and null values sort last when ascending and
//! first when descending.

use std::cmp::Ordering;

use serde_json::Value;

use super::values::{compare_text, date_millis, sort_text};
use crate::document::{get_record_path, Record};
use crate::query::SortClause;

/// Sorts records by a list of clauses
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts records in place. Clauses apply in order; later clauses only
    /// break ties left by earlier ones.
    pub fn sort(records: &mut [Record], clauses: &[SortClause]) {
        if clauses.is_empty() {
            return;
        }

        records.sort_by(|a, b| {
            clauses
                .iter()
                .map(|clause| Self::compare_clause(a, b, clause))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    fn compare_clause(a: &Record, b: &Record, clause: &SortClause) -> Ordering {
        let a_val = get_record_path(a, &clause.field).filter(|v| !v.is_null());
        let b_val = get_record_path(b, &clause.field).filter(|v| !v.is_null());

        match (a_val, b_val) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) if clause.ascending => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) if clause.ascending => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => {
                let ordering = Self::compare_values(a_val, b_val);
                if clause.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
        }
    }

    /// Compares two non-null values.
    ///
    /// Ordering rules:
    /// - dates by millisecond timestamp
    /// - strings case-insensitively
    /// - numbers numerically
    /// - anything else by its string rendering
    fn compare_values(a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::String(a_s), Value::String(b_s)) => {
                match (date_millis(a_s), date_millis(b_s)) {
                    (Some(a_ms), Some(b_ms)) => a_ms.cmp(&b_ms),
                    _ => compare_text(a_s, b_s),
                }
            }
            (Value::Number(a_n), Value::Number(b_n)) => {
                let a_f = a_n.as_f64().unwrap_or(0.0);
                let b_f = b_n.as_f64().unwrap_or(0.0);
                a_f.partial_cmp(&b_f).unwrap_or(Ordering::Equal)
            }
            (Value::Bool(a_b), Value::Bool(b_b)) => a_b.cmp(b_b),
            _ => compare_text(&sort_text(a), &sort_text(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_sort_ascending_nulls_last() {
        let mut docs = records(vec![
            json!({"id": "a", "qty": 3}),
            json!({"id": "b"}),
            json!({"id": "c", "qty": 1}),
            json!({"id": "d", "qty": null}),
        ]);

        ResultSorter::sort(&mut docs, &[SortClause::asc("qty")]);
        assert_eq!(ids(&docs), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_sort_descending_nulls_first() {
        let mut docs = records(vec![
            json!({"id": "a", "qty": 3}),
            json!({"id": "b"}),
            json!({"id": "c", "qty": 1}),
        ]);

        ResultSorter::sort(&mut docs, &[SortClause::desc("qty")]);
        assert_eq!(ids(&docs), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_multi_key_is_stable() {
        let mut docs = records(vec![
            json!({"id": "a", "group": "x", "rank": 2}),
            json!({"id": "b", "group": "y", "rank": 1}),
            json!({"id": "c", "group": "x", "rank": 1}),
            json!({"id": "d", "group": "x", "rank": 1}),
        ]);

        ResultSorter::sort(
            &mut docs,
            &[SortClause::asc("group"), SortClause::asc("rank")],
        );
        assert_eq!(ids(&docs), vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn test_strings_case_insensitive() {
        let mut docs = records(vec![
            json!({"id": "1", "name": "bob"}),
            json!({"id": "2", "name": "Alice"}),
            json!({"id": "3", "name": "charlie"}),
        ]);

        ResultSorter::sort(&mut docs, &[SortClause::asc("name")]);
        assert_eq!(ids(&docs), vec!["2", "1", "3"]);
    }

    #[test]
    fn test_dates_by_timestamp() {
        let mut docs = records(vec![
            json!({"id": "late", "at": "2024-01-01T10:00:00Z"}),
            json!({"id": "early", "at": "2024-01-01T11:00:00+05:00"}),
        ]);

        ResultSorter::sort(&mut docs, &[SortClause::asc("at")]);
        assert_eq!(ids(&docs), vec!["early", "late"]);
    }

    #[test]
    fn test_mixed_types_fall_back_to_text() {
        let mut docs = records(vec![
            json!({"id": "s", "v": "b"}),
            json!({"id": "n", "v": 10}),
        ]);

        ResultSorter::sort(&mut docs, &[SortClause::asc("v")]);
        assert_eq!(ids(&docs), vec!["n", "s"]);
    }
}
