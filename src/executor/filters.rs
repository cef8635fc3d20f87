//! In-memory predicate filtering
//!
//! Evaluates condition trees directly against records with the same
//! operator semantics the compiler emits as Cosmos SQL. Missing and null
//! fields are treated alike.

use serde_json::Value;

use super::values::{compare_scalars, values_equal};
use crate::document::{get_record_path, Record};
use crate::query::{
    strip_wildcards, ConditionBranch, ConditionLeaf, ConditionTree, Aggregator, Operator,
    QueryError, QueryResult, RELATION_SEPARATOR,
};

/// Evaluates condition trees against records
pub struct PredicateFilter;

impl PredicateFilter {
    /// Keeps the records matching the tree. An absent tree keeps everything.
    pub fn filter(records: Vec<Record>, tree: Option<&ConditionTree>) -> QueryResult<Vec<Record>> {
        let tree = match tree {
            Some(tree) => tree,
            None => return Ok(records),
        };

        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if Self::matches(&record, tree)? {
                kept.push(record);
            }
        }
        Ok(kept)
    }

    /// Checks if a record matches a condition tree
    pub fn matches(record: &Record, tree: &ConditionTree) -> QueryResult<bool> {
        match tree {
            ConditionTree::Leaf(leaf) => Self::matches_leaf(record, leaf),
            ConditionTree::Branch(branch) => Self::matches_branch(record, branch),
        }
    }

    fn matches_branch(record: &Record, branch: &ConditionBranch) -> QueryResult<bool> {
        if branch.conditions.is_empty() {
            return Err(QueryError::invalid_condition_tree(format!(
                "{} branch must have at least one condition",
                branch.aggregator.keyword()
            )));
        }

        for child in &branch.conditions {
            let matched = Self::matches(record, child)?;
            match (branch.aggregator, matched) {
                (Aggregator::And, false) => return Ok(false),
                (Aggregator::Or, true) => return Ok(true),
                _ => {}
            }
        }

        Ok(branch.aggregator == Aggregator::And)
    }

    fn matches_leaf(record: &Record, leaf: &ConditionLeaf) -> QueryResult<bool> {
        if leaf.field.contains(RELATION_SEPARATOR) {
            return Err(QueryError::unsupported_relation(&leaf.field));
        }

        let actual = get_record_path(record, &leaf.field).filter(|v| !v.is_null());
        let expected = &leaf.value;

        let matched = match leaf.operator {
            Operator::Present => actual.is_some(),
            Operator::Missing => actual.is_none(),
            Operator::Equal if expected.is_null() => actual.is_none(),
            Operator::NotEqual if expected.is_null() => actual.is_some(),
            Operator::Equal => actual.map_or(false, |a| values_equal(a, expected)),
            Operator::NotEqual => actual.map_or(false, |a| !values_equal(a, expected)),
            Operator::In => Self::in_list(actual, expected),
            Operator::NotIn => Self::not_in_list(actual, expected),
            Operator::LessThan => actual
                .and_then(|a| compare_scalars(a, expected))
                .map_or(false, |ord| ord.is_lt()),
            Operator::GreaterThan => actual
                .and_then(|a| compare_scalars(a, expected))
                .map_or(false, |ord| ord.is_gt()),
            Operator::Like => Self::text_match(actual, expected, |a, p| {
                a.contains(strip_wildcards(p))
            }),
            Operator::ILike => Self::text_match(actual, expected, |a, p| {
                a.to_lowercase()
                    .contains(&strip_wildcards(p).to_lowercase())
            }),
            Operator::Contains => Self::text_match(actual, expected, |a, p| a.contains(p)),
            Operator::NotContains => Self::text_match(actual, expected, |a, p| !a.contains(p)),
            Operator::StartsWith => Self::text_match(actual, expected, |a, p| a.starts_with(p)),
            Operator::EndsWith => Self::text_match(actual, expected, |a, p| a.ends_with(p)),
            Operator::IncludesAll => Self::includes_all(actual, expected),
            other => return Err(QueryError::unsupported_operator(other, &leaf.field)),
        };

        Ok(matched)
    }

    fn candidates(expected: &Value) -> Vec<&Value> {
        match expected {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    fn in_list(actual: Option<&Value>, expected: &Value) -> bool {
        let candidates = Self::candidates(expected);
        match actual {
            None => candidates.iter().any(|c| c.is_null()),
            Some(a) => candidates.iter().any(|c| values_equal(a, c)),
        }
    }

    fn not_in_list(actual: Option<&Value>, expected: &Value) -> bool {
        let candidates = Self::candidates(expected);
        if candidates.is_empty() {
            return true;
        }
        match actual {
            None => !candidates.iter().any(|c| c.is_null()),
            Some(a) => !candidates.iter().any(|c| values_equal(a, c)),
        }
    }

    fn text_match<F>(actual: Option<&Value>, expected: &Value, predicate: F) -> bool
    where
        F: Fn(&str, &str) -> bool,
    {
        match (actual.and_then(Value::as_str), expected.as_str()) {
            (Some(a), Some(p)) => predicate(a, p),
            _ => false,
        }
    }

    fn includes_all(actual: Option<&Value>, expected: &Value) -> bool {
        let candidates = Self::candidates(expected);
        match actual.and_then(Value::as_array) {
            Some(items) => candidates
                .iter()
                .all(|c| items.iter().any(|item| values_equal(item, c))),
            None => candidates.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn matches(doc: Value, tree: ConditionTree) -> bool {
        PredicateFilter::matches(&record(doc), &tree).unwrap()
    }

    #[test]
    fn test_equality_match() {
        let tree = ConditionTree::leaf("sku", Operator::Equal, json!("A"));
        assert!(matches(json!({"sku": "A"}), tree.clone()));
        assert!(!matches(json!({"sku": "B"}), tree.clone()));
        assert!(!matches(json!({}), tree));
    }

    #[test]
    fn test_null_equality_degrades() {
        let eq_null = ConditionTree::leaf("a", Operator::Equal, Value::Null);
        assert!(matches(json!({}), eq_null.clone()));
        assert!(matches(json!({"a": null}), eq_null.clone()));
        assert!(!matches(json!({"a": 1}), eq_null));

        let neq_null = ConditionTree::leaf("a", Operator::NotEqual, Value::Null);
        assert!(matches(json!({"a": 1}), neq_null.clone()));
        assert!(!matches(json!({}), neq_null));
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(!matches(json!({"a": 1}), ConditionTree::leaf("a", Operator::In, json!([]))));
        assert!(matches(json!({"a": 1}), ConditionTree::leaf("a", Operator::NotIn, json!([]))));
        assert!(matches(json!({"a": 2}), ConditionTree::leaf("a", Operator::In, json!([1, 2]))));
        assert!(matches(json!({}), ConditionTree::leaf("a", Operator::In, json!([1, null]))));
        assert!(matches(json!({"a": "x"}), ConditionTree::leaf("a", Operator::In, json!("x"))));
        assert!(!matches(json!({"a": 2}), ConditionTree::leaf("a", Operator::NotIn, json!([2]))));
    }

    #[test]
    fn test_range_predicates() {
        let doc = json!({"qty": 5, "at": "2024-03-01T00:00:00Z"});
        assert!(matches(doc.clone(), ConditionTree::leaf("qty", Operator::LessThan, json!(6))));
        assert!(!matches(doc.clone(), ConditionTree::leaf("qty", Operator::GreaterThan, json!(5))));
        assert!(matches(
            doc.clone(),
            ConditionTree::leaf("at", Operator::GreaterThan, json!("2024-02-01"))
        ));
        // No coercion across kinds
        assert!(!matches(doc, ConditionTree::leaf("qty", Operator::LessThan, json!("6"))));
    }

    #[test]
    fn test_text_predicates() {
        let doc = json!({"name": "Johnson"});
        assert!(matches(doc.clone(), ConditionTree::leaf("name", Operator::Like, json!("%son"))));
        assert!(!matches(doc.clone(), ConditionTree::leaf("name", Operator::Like, json!("%SON"))));
        assert!(matches(doc.clone(), ConditionTree::leaf("name", Operator::ILike, json!("%SON%"))));
        assert!(matches(doc.clone(), ConditionTree::leaf("name", Operator::StartsWith, json!("Jo"))));
        assert!(matches(doc.clone(), ConditionTree::leaf("name", Operator::EndsWith, json!("on"))));
        assert!(matches(doc.clone(), ConditionTree::leaf("name", Operator::NotContains, json!("x"))));
        assert!(!matches(json!({}), ConditionTree::leaf("name", Operator::NotContains, json!("x"))));
    }

    #[test]
    fn test_includes_all() {
        let doc = json!({"tags": ["a", "b", "c"]});
        assert!(matches(doc.clone(), ConditionTree::leaf("tags", Operator::IncludesAll, json!(["a", "c"]))));
        assert!(!matches(doc, ConditionTree::leaf("tags", Operator::IncludesAll, json!(["a", "z"]))));
    }

    #[test]
    fn test_branches() {
        let doc = json!({"a": 1, "b": 2});
        let and = ConditionTree::and(vec![
            ConditionTree::leaf("a", Operator::Equal, json!(1)),
            ConditionTree::leaf("b", Operator::Equal, json!(3)),
        ]);
        let or = ConditionTree::or(vec![
            ConditionTree::leaf("a", Operator::Equal, json!(9)),
            ConditionTree::leaf("b", Operator::Equal, json!(2)),
        ]);
        assert!(!matches(doc.clone(), and));
        assert!(matches(doc, or));
    }

    #[test]
    fn test_nested_field() {
        let doc = json!({"address": {"city": "Paris"}});
        assert!(matches(doc, ConditionTree::leaf("address->city", Operator::Equal, json!("Paris"))));
    }

    #[test]
    fn test_unsupported_operator() {
        let err = PredicateFilter::matches(
            &record(json!({"a": 1})),
            &ConditionTree::leaf("a", Operator::Match, json!("^a")),
        )
        .unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::UnsupportedOperator);
    }

    #[test]
    fn test_filter_without_tree_keeps_all() {
        let records = vec![record(json!({"a": 1})), record(json!({"a": 2}))];
        assert_eq!(PredicateFilter::filter(records, None).unwrap().len(), 2);
    }
}
