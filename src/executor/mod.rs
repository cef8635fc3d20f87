//! In-memory execution of collection filters
//!
//! Used wherever records are materialized locally instead of being
//! filtered by the document store.
//!
//! # Execution Flow (strict order)
//!
//! 1. Filter records according to the condition tree
//! 2. Apply sort (if specified)
//! 3. Apply skip/limit

mod filters;
mod sorter;
mod values;

pub use filters::PredicateFilter;
pub use sorter::ResultSorter;
pub use values::{compare_scalars, date_millis, values_equal};

use crate::document::Record;
use crate::query::{Filter, Page, QueryResult};

/// Applies skip/limit as the final slice
pub fn paginate(records: Vec<Record>, page: Option<&Page>) -> Vec<Record> {
    match page {
        None => records,
        Some(page) => records
            .into_iter()
            .skip(page.skip)
            .take(page.limit.unwrap_or(usize::MAX))
            .collect(),
    }
}

/// Runs filter, sort and pagination over materialized records
pub fn execute(records: Vec<Record>, filter: &Filter) -> QueryResult<Vec<Record>> {
    let mut matched = PredicateFilter::filter(records, filter.condition_tree.as_ref())?;
    ResultSorter::sort(&mut matched, &filter.sort);
    Ok(paginate(matched, filter.page.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ConditionTree, Operator, SortClause};
    use serde_json::json;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| json!({"n": i, "even": i % 2 == 0}).as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_paginate() {
        let page = Page::new(2, 3);
        let sliced = paginate(records(10), Some(&page));
        assert_eq!(sliced.len(), 3);
        assert_eq!(sliced[0]["n"], json!(2));

        let unbounded = Page {
            skip: 8,
            limit: None,
        };
        assert_eq!(paginate(records(10), Some(&unbounded)).len(), 2);
    }

    #[test]
    fn test_execute_order() {
        let filter = Filter::from_tree(ConditionTree::leaf("even", Operator::Equal, json!(true)))
            .with_sort(SortClause::desc("n"))
            .with_page(Page::new(1, 2));

        let result = execute(records(10), &filter).unwrap();
        let values: Vec<_> = result.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(values, vec![json!(6), json!(4)]);
    }
}
