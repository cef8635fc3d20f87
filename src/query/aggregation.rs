//! Aggregate query compilation
//!
//! Builds ungrouped and single-field grouped aggregate queries on top of the
//! condition compiler, and shapes raw rows into `AggregateResult`s.
//!
//! Multi-field and date-bucketed grouping are not implemented and fail
//! explicitly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ast::ConditionTree;
use super::compiler::{field_path, ConditionCompiler, ParameterBinder, QuerySpec, ROOT_ALIAS};
use super::errors::{QueryError, QueryResult};

/// Column alias of the aggregate value
pub const AGGREGATE_VALUE_KEY: &str = "aggregateValue";

/// Column alias of the group key
pub const GROUP_KEY: &str = "groupKey";

/// Key older query shapes used for the aggregate value
const LEGACY_VALUE_KEY: &str = "value";

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOperation {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateOperation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateOperation::Count => "COUNT",
            AggregateOperation::Sum => "SUM",
            AggregateOperation::Avg => "AVG",
            AggregateOperation::Max => "MAX",
            AggregateOperation::Min => "MIN",
        }
    }
}

/// Date bucketing applied to a group field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateOperation {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

/// One grouping clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationGroup {
    pub field: String,
    #[serde(default)]
    pub operation: Option<DateOperation>,
}

impl AggregationGroup {
    pub fn by(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operation: None,
        }
    }
}

/// Aggregation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub operation: AggregateOperation,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub groups: Vec<AggregationGroup>,
}

impl Aggregation {
    /// Count of all matching rows
    pub fn count() -> Self {
        Self {
            operation: AggregateOperation::Count,
            field: None,
            groups: Vec::new(),
        }
    }

    pub fn new(operation: AggregateOperation, field: Option<&str>) -> Self {
        Self {
            operation,
            field: field.map(str::to_string),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: AggregationGroup) -> Self {
        self.groups.push(group);
        self
    }
}

/// One aggregate row returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub value: Value,
    pub group: Map<String, Value>,
}

/// Compiles aggregations into Cosmos SQL
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationCompiler {
    conditions: ConditionCompiler,
}

impl AggregationCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles an aggregate query. `limit` bounds the number of groups.
    pub fn compile(
        &self,
        aggregation: &Aggregation,
        tree: Option<&ConditionTree>,
        limit: Option<usize>,
    ) -> QueryResult<QuerySpec> {
        let aggregate = Self::aggregate_expression(aggregation)?;
        let group = Self::group_field(aggregation)?;

        let mut binder = ParameterBinder::new();
        let predicate = match tree {
            Some(tree) => self.conditions.compile_into(tree, &mut binder)?,
            None => String::new(),
        };

        let mut text = match &group {
            Some(group_path) => format!(
                "SELECT {} AS {}, {} AS {} FROM {}",
                group_path, GROUP_KEY, aggregate, AGGREGATE_VALUE_KEY, ROOT_ALIAS
            ),
            None => format!(
                "SELECT {} AS {} FROM {}",
                aggregate, AGGREGATE_VALUE_KEY, ROOT_ALIAS
            ),
        };

        if !predicate.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&predicate);
        }

        if let Some(group_path) = &group {
            text.push_str(&format!(" GROUP BY {} ORDER BY {}", group_path, group_path));
            if let Some(limit) = limit {
                text.push_str(&format!(" OFFSET 0 LIMIT {}", limit));
            }
        }

        Ok(binder.finish(text))
    }

    /// Shapes raw rows into aggregate results
    pub fn post_process(rows: &[Value], aggregation: &Aggregation) -> Vec<AggregateResult> {
        match aggregation.groups.first() {
            None if rows.is_empty() => vec![AggregateResult {
                value: Value::from(0),
                group: Map::new(),
            }],
            None => rows
                .iter()
                .map(|row| AggregateResult {
                    value: Self::row_value(row),
                    group: Map::new(),
                })
                .collect(),
            Some(group) => rows
                .iter()
                .map(|row| {
                    let key = row
                        .get(GROUP_KEY)
                        .or_else(|| row.get(format!("{}0", GROUP_KEY).as_str()))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let mut group_values = Map::new();
                    group_values.insert(group.field.clone(), key);
                    AggregateResult {
                        value: Self::row_value(row),
                        group: group_values,
                    }
                })
                .collect(),
        }
    }

    fn row_value(row: &Value) -> Value {
        match row {
            Value::Object(obj) => obj
                .get(AGGREGATE_VALUE_KEY)
                .or_else(|| obj.get(LEGACY_VALUE_KEY))
                .cloned()
                .unwrap_or(Value::Null),
            scalar => scalar.clone(),
        }
    }

    fn aggregate_expression(aggregation: &Aggregation) -> QueryResult<String> {
        let operation = aggregation.operation;
        match (&aggregation.field, operation) {
            (None, AggregateOperation::Count) => Ok("COUNT(1)".to_string()),
            (None, _) => Err(QueryError::invalid_aggregation(format!(
                "{} aggregation requires a field",
                operation.as_sql()
            ))),
            (Some(field), _) => Ok(format!("{}({})", operation.as_sql(), field_path(field)?)),
        }
    }

    fn group_field(aggregation: &Aggregation) -> QueryResult<Option<String>> {
        match aggregation.groups.as_slice() {
            [] => Ok(None),
            [group] => {
                if let Some(date_operation) = group.operation {
                    return Err(QueryError::unsupported_aggregation(format!(
                        "date grouping ({:?}) on '{}' is not implemented",
                        date_operation, group.field
                    )));
                }
                field_path(&group.field).map(Some)
            }
            groups => Err(QueryError::unsupported_aggregation(format!(
                "grouping by {} fields is not implemented",
                groups.len()
            ))),
        }
    }
}
