//! Query subsystem
//!
//! Compiles collection filters into parameterized Cosmos SQL.
//!
//! # Flow
//!
//! 1. Every field reference passes `FieldValidator`
//! 2. `ConditionCompiler` turns the condition tree into a WHERE fragment
//! 3. `PartitionKeyExtractor` looks for a single-partition routing value
//! 4. `AggregationCompiler` wraps the fragment into aggregate queries
//!
//! Values never reach query text; they are bound as `@paramN`.

mod aggregation;
mod ast;
mod compiler;
mod errors;
mod partition;
mod validator;

pub use aggregation::{
    AggregateOperation, AggregateResult, Aggregation, AggregationCompiler, AggregationGroup,
    DateOperation, AGGREGATE_VALUE_KEY, GROUP_KEY,
};
pub use ast::{
    Aggregator, ConditionBranch, ConditionLeaf, ConditionTree, Filter, Operator, Page,
    Projection, SortClause, NESTED_SEPARATOR, RELATION_SEPARATOR,
};
pub use compiler::{field_path, ConditionCompiler, QueryParameter, QuerySpec, ROOT_ALIAS};
pub use errors::{ErrorCategory, QueryError, QueryErrorCode, QueryResult};
pub use partition::{PartitionKeyExtractor, PartitionKeyValue};
pub use validator::FieldValidator;

pub(crate) use compiler::strip_wildcards;
