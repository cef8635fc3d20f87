//! Partition key extraction
//!
//! Finds a partition key value a condition tree provably pins to a single
//! partition. The result is a routing hint: `None` is always safe and falls
//! back to a cross-partition query.

use serde_json::Value;

use super::ast::{Aggregator, ConditionTree, Operator, NESTED_SEPARATOR};

/// A partition key value usable for single-partition routing
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKeyValue {
    String(String),
    Number(serde_json::Number),
}

impl PartitionKeyValue {
    /// Converts a JSON value, keeping only strings and numbers
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PartitionKeyValue::String(s.clone())),
            Value::Number(n) => Some(PartitionKeyValue::Number(n.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PartitionKeyValue::String(s) => Value::String(s.clone()),
            PartitionKeyValue::Number(n) => Value::Number(n.clone()),
        }
    }
}

/// Extracts single-partition key values from condition trees
pub struct PartitionKeyExtractor;

impl PartitionKeyExtractor {
    /// Normalizes a container partition key path (`/address/city`) to a
    /// field name (`address->city`)
    pub fn normalize_path(partition_key_path: &str) -> String {
        partition_key_path
            .trim_start_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(NESTED_SEPARATOR)
    }

    /// Returns the partition key value if the tree guarantees one
    pub fn extract(
        tree: Option<&ConditionTree>,
        partition_key_path: &str,
    ) -> Option<PartitionKeyValue> {
        let target = Self::normalize_path(partition_key_path);
        if target.is_empty() {
            return None;
        }
        tree.and_then(|tree| Self::extract_from(tree, &target))
    }

    fn extract_from(tree: &ConditionTree, target: &str) -> Option<PartitionKeyValue> {
        match tree {
            ConditionTree::Leaf(leaf) => {
                if leaf.field == target && leaf.operator == Operator::Equal {
                    PartitionKeyValue::from_json(&leaf.value)
                } else {
                    None
                }
            }
            ConditionTree::Branch(branch) => match branch.aggregator {
                Aggregator::And => branch
                    .conditions
                    .iter()
                    .find_map(|child| Self::extract_from(child, target)),
                Aggregator::Or => None,
            },
        }
    }
}
