//! Condition tree and filter structures
//!
//! Defines the collection-level filter representation consumed by the
//! compiler, the partition key extractor and the in-memory evaluator.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{QueryError, QueryResult};

/// Separator for nested field paths (`address->city`)
pub const NESTED_SEPARATOR: &str = "->";

/// Separator for relation-qualified fields (`author:name`)
pub const RELATION_SEPARATOR: char = ':';

/// Leaf comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Present,
    Missing,
    Equal,
    NotEqual,
    In,
    NotIn,
    LessThan,
    GreaterThan,
    Like,
    ILike,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IncludesAll,
    // Host operators without a query template
    LessThanOrEqual,
    GreaterThanOrEqual,
    Match,
    Before,
    After,
    ShorterThan,
    LongerThan,
    Blank,
}

impl Operator {
    /// Returns the operator name as sent by the host agent
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Present => "Present",
            Operator::Missing => "Missing",
            Operator::Equal => "Equal",
            Operator::NotEqual => "NotEqual",
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::LessThan => "LessThan",
            Operator::GreaterThan => "GreaterThan",
            Operator::Like => "Like",
            Operator::ILike => "ILike",
            Operator::Contains => "Contains",
            Operator::NotContains => "NotContains",
            Operator::StartsWith => "StartsWith",
            Operator::EndsWith => "EndsWith",
            Operator::IncludesAll => "IncludesAll",
            Operator::LessThanOrEqual => "LessThanOrEqual",
            Operator::GreaterThanOrEqual => "GreaterThanOrEqual",
            Operator::Match => "Match",
            Operator::Before => "Before",
            Operator::After => "After",
            Operator::ShorterThan => "ShorterThan",
            Operator::LongerThan => "LongerThan",
            Operator::Blank => "Blank",
        }
    }

    /// Parses an operator name, accepting any casing and snake_case
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        Self::all()
            .iter()
            .copied()
            .find(|op| op.as_str().to_lowercase() == normalized)
    }

    fn all() -> &'static [Operator] {
        &[
            Operator::Present,
            Operator::Missing,
            Operator::Equal,
            Operator::NotEqual,
            Operator::In,
            Operator::NotIn,
            Operator::LessThan,
            Operator::GreaterThan,
            Operator::Like,
            Operator::ILike,
            Operator::Contains,
            Operator::NotContains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::IncludesAll,
            Operator::LessThanOrEqual,
            Operator::GreaterThanOrEqual,
            Operator::Match,
            Operator::Before,
            Operator::After,
            Operator::ShorterThan,
            Operator::LongerThan,
            Operator::Blank,
        ]
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Branch aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregator {
    And,
    Or,
}

impl Aggregator {
    /// Returns the keyword used to join compiled fragments
    pub fn keyword(&self) -> &'static str {
        match self {
            Aggregator::And => "AND",
            Aggregator::Or => "OR",
        }
    }
}

/// A single comparison (field + operator + value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLeaf {
    /// Field name, arrow-separated for nested paths
    pub field: String,
    /// Comparison operator
    pub operator: Operator,
    /// Comparison value (null when the operator takes none)
    #[serde(default)]
    pub value: Value,
}

impl ConditionLeaf {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Conjunction or disjunction of sub-trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBranch {
    pub aggregator: Aggregator,
    pub conditions: Vec<ConditionTree>,
}

/// Recursive predicate structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionTree {
    Branch(ConditionBranch),
    Leaf(ConditionLeaf),
}

impl ConditionTree {
    /// Create a leaf
    pub fn leaf(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        ConditionTree::Leaf(ConditionLeaf::new(field, operator, value))
    }

    /// Create an AND branch
    pub fn and(conditions: Vec<ConditionTree>) -> Self {
        ConditionTree::Branch(ConditionBranch {
            aggregator: Aggregator::And,
            conditions,
        })
    }

    /// Create an OR branch
    pub fn or(conditions: Vec<ConditionTree>) -> Self {
        ConditionTree::Branch(ConditionBranch {
            aggregator: Aggregator::Or,
            conditions,
        })
    }

    /// Returns the leaf if this tree is a single comparison
    pub fn as_leaf(&self) -> Option<&ConditionLeaf> {
        match self {
            ConditionTree::Leaf(leaf) => Some(leaf),
            ConditionTree::Branch(_) => None,
        }
    }

    /// Parses an untyped condition tree received from the host agent.
    ///
    /// Shape is decided by the keys present on the object: `aggregator` +
    /// `conditions` is a branch, `field` + `operator` is a leaf. Anything
    /// else is a structural error.
    pub fn from_json(raw: &Value) -> QueryResult<Self> {
        let obj = raw.as_object().ok_or_else(|| {
            QueryError::invalid_condition_tree(format!(
                "condition tree must be an object, got {}",
                raw
            ))
        })?;

        if obj.contains_key("aggregator") || obj.contains_key("conditions") {
            let aggregator = match obj.get("aggregator").and_then(Value::as_str) {
                Some(name) if name.eq_ignore_ascii_case("and") => Aggregator::And,
                Some(name) if name.eq_ignore_ascii_case("or") => Aggregator::Or,
                Some(name) => {
                    return Err(QueryError::invalid_condition_tree(format!(
                        "invalid branch aggregator '{}'",
                        name
                    )))
                }
                None => {
                    return Err(QueryError::invalid_condition_tree(
                        "branch aggregator is missing or empty",
                    ))
                }
            };

            let raw_conditions = obj
                .get("conditions")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    QueryError::invalid_condition_tree("branch conditions must be an array")
                })?;

            if raw_conditions.is_empty() {
                return Err(QueryError::invalid_condition_tree(
                    "branch must have at least one condition",
                ));
            }

            let conditions = raw_conditions
                .iter()
                .map(Self::from_json)
                .collect::<QueryResult<Vec<_>>>()?;

            return Ok(ConditionTree::Branch(ConditionBranch {
                aggregator,
                conditions,
            }));
        }

        if let (Some(field), Some(operator)) = (obj.get("field"), obj.get("operator")) {
            let field = field.as_str().ok_or_else(|| {
                QueryError::invalid_condition_tree("leaf field must be a string")
            })?;
            let operator_name = operator.as_str().ok_or_else(|| {
                QueryError::invalid_condition_tree("leaf operator must be a string")
            })?;
            let operator = Operator::parse(operator_name).ok_or_else(|| {
                QueryError::unsupported_operator(operator_name, field)
            })?;
            let value = obj.get("value").cloned().unwrap_or(Value::Null);

            return Ok(ConditionTree::leaf(field, operator, value));
        }

        Err(QueryError::invalid_condition_tree(format!(
            "unknown condition tree shape: {}",
            raw
        )))
    }
}

/// One ordering clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub ascending: bool,
}

impl SortClause {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    pub fn direction(&self) -> &'static str {
        if self.ascending {
            "ASC"
        } else {
            "DESC"
        }
    }
}

/// Skip/limit pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
        }
    }

    /// Returns true if the page bounds the result size
    pub fn is_bounded(&self) -> bool {
        self.limit.is_some()
    }
}

/// Field names to return, arrow-separated for nested fields
pub type Projection = Vec<String>;

/// Collection filter: condition tree plus ordering and pagination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub condition_tree: Option<ConditionTree>,
    #[serde(default)]
    pub sort: Vec<SortClause>,
    pub page: Option<Page>,
}

impl Filter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter around a condition tree
    pub fn from_tree(tree: ConditionTree) -> Self {
        Self {
            condition_tree: Some(tree),
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, clause: SortClause) -> Self {
        self.sort.push(clause);
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// Returns the same filter without pagination
    pub fn without_page(&self) -> Self {
        Self {
            page: None,
            ..self.clone()
        }
    }
}
