//! cosmos-collections - Cosmos DB query compiler and virtual array collections
//!
//! Lets an admin-panel agent treat Cosmos DB containers, and the arrays
//! nested inside their documents, as uniform collections.

pub mod collection;
pub mod document;
pub mod executor;
pub mod query;

pub use collection::{
    Caller, CollectionError, CollectionResult, CompositeId, CosmosCollection,
    CosmosCollectionConfig, DocumentCollection, DocumentStore, InMemoryCollection,
    MutationOutcome, StoreError, TargetOutcome, VirtualArrayCollection, VirtualCollectionConfig,
};
pub use document::Record;
pub use query::{
    AggregateResult, Aggregation, ConditionCompiler, ConditionTree, Filter, Operator, QueryError,
    QuerySpec,
};
