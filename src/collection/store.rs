//! Document store contract
//!
//! The container-level client a `CosmosCollection` runs its queries and
//! writes against. Timeouts, retries and cancellation belong to the
//! implementation.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::errors::StoreError;
use crate::query::{PartitionKeyValue, QuerySpec};

/// Boxed future returned by document store calls
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Cosmos DB container client
pub trait DocumentStore: Send + Sync {
    /// Execute a parameterized query. A partition key routes the query to a
    /// single partition; `None` fans out across partitions.
    fn query<'a>(
        &'a self,
        spec: &'a QuerySpec,
        partition_key: Option<&'a PartitionKeyValue>,
    ) -> StoreFuture<'a, Vec<Value>>;

    /// Insert or replace a whole document
    fn upsert_item<'a>(
        &'a self,
        document: Value,
        partition_key: Option<PartitionKeyValue>,
    ) -> StoreFuture<'a, Value>;

    /// Delete a document by id
    fn delete_item<'a>(
        &'a self,
        id: &'a str,
        partition_key: Option<PartitionKeyValue>,
    ) -> StoreFuture<'a, ()>;
}
