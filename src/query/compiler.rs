//! Condition tree compilation
//!
//! Turns a `ConditionTree` into parameterized Cosmos SQL. Values are always
//! bound as `@paramN`; only validated field names reach the query text.
//!
//! Parameter numbering restarts at zero for every top-level call, so the
//! compiler holds no state between invocations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ast::{
    ConditionBranch, ConditionLeaf, ConditionTree, Operator, SortClause, NESTED_SEPARATOR,
    RELATION_SEPARATOR,
};
use super::errors::{QueryError, QueryResult};
use super::validator::FieldValidator;

/// Alias of the document root in generated queries
pub const ROOT_ALIAS: &str = "c";

/// Wildcard stripped from Like/ILike patterns
const LIKE_WILDCARD: char = '%';

/// A named query parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

/// Query text plus its bound parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub text: String,
    pub parameters: Vec<QueryParameter>,
}

impl QuerySpec {
    /// Returns the value bound to a parameter name
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Returns true if no predicate text was produced
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Allocates positional parameter names for one compilation
#[derive(Debug, Default)]
pub(crate) struct ParameterBinder {
    parameters: Vec<QueryParameter>,
}

impl ParameterBinder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Binds a value and returns its placeholder
    pub(crate) fn bind(&mut self, value: Value) -> String {
        let name = format!("@param{}", self.parameters.len());
        self.parameters.push(QueryParameter {
            name: name.clone(),
            value,
        });
        name
    }

    pub(crate) fn finish(self, text: String) -> QuerySpec {
        QuerySpec {
            text,
            parameters: self.parameters,
        }
    }
}

/// Resolves a field name to its path in query text (`a->b` becomes `c.a.b`)
pub fn field_path(field: &str) -> QueryResult<String> {
    if field.contains(RELATION_SEPARATOR) {
        return Err(QueryError::unsupported_relation(field));
    }
    FieldValidator::validate(field)?;

    let mut path = String::from(ROOT_ALIAS);
    for segment in field.split(NESTED_SEPARATOR) {
        path.push('.');
        path.push_str(segment);
    }
    Ok(path)
}

fn present(path: &str) -> String {
    format!("(IS_DEFINED({path}) AND NOT IS_NULL({path}))")
}

fn missing_terms(path: &str) -> String {
    format!("NOT IS_DEFINED({path}) OR IS_NULL({path})")
}

fn missing(path: &str) -> String {
    format!("({})", missing_terms(path))
}

/// Coerces a leaf value into a list of candidates
fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Strips a single leading and a single trailing wildcard
pub(crate) fn strip_wildcards(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix(LIKE_WILDCARD).unwrap_or(pattern);
    pattern.strip_suffix(LIKE_WILDCARD).unwrap_or(pattern)
}

fn join_fragments(fragments: Vec<String>, keyword: &str) -> String {
    match fragments.len() {
        0 => String::new(),
        1 => fragments.into_iter().next().unwrap_or_default(),
        _ => format!("({})", fragments.join(&format!(" {} ", keyword))),
    }
}

/// Compiles condition trees, projections and sorts into Cosmos SQL
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionCompiler;

impl ConditionCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compiles a WHERE-clause fragment. An absent tree yields empty text.
    pub fn compile(&self, tree: Option<&ConditionTree>) -> QueryResult<QuerySpec> {
        let mut binder = ParameterBinder::new();
        let text = match tree {
            Some(tree) => self.compile_into(tree, &mut binder)?,
            None => String::new(),
        };
        Ok(binder.finish(text))
    }

    /// Compiles a complete SELECT statement
    pub fn compile_full(
        &self,
        tree: Option<&ConditionTree>,
        sort: &[SortClause],
        projection: Option<&[String]>,
    ) -> QueryResult<QuerySpec> {
        let select = self.compile_projection(projection)?;
        let mut binder = ParameterBinder::new();

        let mut text = format!("SELECT {} FROM {}", select, ROOT_ALIAS);

        if let Some(tree) = tree {
            let predicate = self.compile_into(tree, &mut binder)?;
            if !predicate.is_empty() {
                text.push_str(" WHERE ");
                text.push_str(&predicate);
            }
        }

        let order = self.compile_sort(sort)?;
        if !order.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&order);
        }

        let spec = binder.finish(text);
        tracing::debug!(
            event = "QUERY_COMPILED",
            text = %spec.text,
            parameters = spec.parameters.len()
        );
        Ok(spec)
    }

    /// Compiles a SELECT list. Nested fields collapse to their top-level
    /// object, selected once.
    pub fn compile_projection(&self, projection: Option<&[String]>) -> QueryResult<String> {
        let fields = match projection {
            Some(fields) if !fields.is_empty() => fields,
            _ => return Ok("*".to_string()),
        };

        let mut selected: Vec<String> = Vec::new();
        for field in fields {
            field_path(field)?;
            let top = field.split(NESTED_SEPARATOR).next().unwrap_or(field);
            let path = format!("{}.{}", ROOT_ALIAS, top);
            if !selected.contains(&path) {
                selected.push(path);
            }
        }

        Ok(selected.join(", "))
    }

    /// Compiles ORDER BY clauses, preserving input order
    pub fn compile_sort(&self, sort: &[SortClause]) -> QueryResult<String> {
        let clauses = sort
            .iter()
            .map(|clause| Ok(format!("{} {}", field_path(&clause.field)?, clause.direction())))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(clauses.join(", "))
    }

    pub(crate) fn compile_into(
        &self,
        tree: &ConditionTree,
        binder: &mut ParameterBinder,
    ) -> QueryResult<String> {
        match tree {
            ConditionTree::Leaf(leaf) => self.compile_leaf(leaf, binder),
            ConditionTree::Branch(branch) => self.compile_branch(branch, binder),
        }
    }

    fn compile_branch(
        &self,
        branch: &ConditionBranch,
        binder: &mut ParameterBinder,
    ) -> QueryResult<String> {
        if branch.conditions.is_empty() {
            return Err(QueryError::invalid_condition_tree(format!(
                "{} branch must have at least one condition",
                branch.aggregator.keyword()
            )));
        }

        let mut fragments = Vec::with_capacity(branch.conditions.len());
        for child in &branch.conditions {
            let fragment = self.compile_into(child, binder)?;
            if !fragment.is_empty() {
                fragments.push(fragment);
            }
        }

        Ok(join_fragments(fragments, branch.aggregator.keyword()))
    }

    fn compile_leaf(
        &self,
        leaf: &ConditionLeaf,
        binder: &mut ParameterBinder,
    ) -> QueryResult<String> {
        let path = field_path(&leaf.field)?;
        let value = &leaf.value;

        let text = match leaf.operator {
            Operator::Present => present(&path),
            Operator::Missing => missing(&path),
            Operator::Equal if value.is_null() => missing(&path),
            Operator::NotEqual if value.is_null() => present(&path),
            Operator::Equal => format!("{} = {}", path, binder.bind(value.clone())),
            Operator::NotEqual => format!("{} != {}", path, binder.bind(value.clone())),
            Operator::LessThan => format!("{} < {}", path, binder.bind(value.clone())),
            Operator::GreaterThan => format!("{} > {}", path, binder.bind(value.clone())),
            Operator::In => Self::compile_in(&path, value, binder),
            Operator::NotIn => Self::compile_not_in(&path, value, binder),
            Operator::Like => {
                let pattern = Self::pattern(leaf)?;
                let param = binder.bind(Value::String(strip_wildcards(pattern).to_string()));
                format!("CONTAINS({}, {})", path, param)
            }
            Operator::ILike => {
                let pattern = Self::pattern(leaf)?;
                let param = binder.bind(Value::String(strip_wildcards(pattern).to_lowercase()));
                format!("CONTAINS(LOWER({}), {})", path, param)
            }
            Operator::Contains => format!("CONTAINS({}, {})", path, binder.bind(value.clone())),
            Operator::NotContains => {
                format!("NOT CONTAINS({}, {})", path, binder.bind(value.clone()))
            }
            Operator::StartsWith => {
                format!("STARTSWITH({}, {})", path, binder.bind(value.clone()))
            }
            Operator::EndsWith => format!("ENDSWITH({}, {})", path, binder.bind(value.clone())),
            Operator::IncludesAll => {
                let fragments = as_list(value)
                    .into_iter()
                    .map(|item| format!("ARRAY_CONTAINS({}, {})", path, binder.bind(item)))
                    .collect::<Vec<_>>();
                if fragments.is_empty() {
                    "true".to_string()
                } else {
                    join_fragments(fragments, "AND")
                }
            }
            other => return Err(QueryError::unsupported_operator(other, &leaf.field)),
        };

        Ok(text)
    }

    fn compile_in(path: &str, value: &Value, binder: &mut ParameterBinder) -> String {
        let values = as_list(value);
        if values.is_empty() {
            return "false".to_string();
        }

        let has_null = values.iter().any(Value::is_null);
        let non_null: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();

        if non_null.is_empty() {
            return missing(path);
        }

        let membership = format!(
            "ARRAY_CONTAINS({}, {})",
            binder.bind(Value::Array(non_null)),
            path
        );

        if has_null {
            format!("({} OR {})", membership, missing_terms(path))
        } else {
            membership
        }
    }

    fn compile_not_in(path: &str, value: &Value, binder: &mut ParameterBinder) -> String {
        let values = as_list(value);
        if values.is_empty() {
            return "true".to_string();
        }

        let has_null = values.iter().any(Value::is_null);
        let non_null: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();

        if non_null.is_empty() {
            return present(path);
        }

        let exclusion = format!(
            "NOT ARRAY_CONTAINS({}, {})",
            binder.bind(Value::Array(non_null)),
            path
        );

        if has_null {
            format!(
                "({} AND IS_DEFINED({}) AND NOT IS_NULL({}))",
                exclusion, path, path
            )
        } else {
            exclusion
        }
    }

    fn pattern(leaf: &ConditionLeaf) -> QueryResult<&str> {
        leaf.value.as_str().ok_or_else(|| {
            QueryError::invalid_condition_tree(format!(
                "{} on '{}' expects a string pattern",
                leaf.operator, leaf.field
            ))
        })
    }
}
