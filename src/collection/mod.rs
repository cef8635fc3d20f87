//! # Collection Module
//!
//! Uniform collection contract shared by physical Cosmos containers,
//! in-memory collections and virtual array collections.
//!
//! ## Design Principles
//!
//! - One `DocumentCollection` trait for physical and virtual collections
//! - Virtual collections reach their parent only through that trait, so the
//!   read-modify-write chain recurses to any depth
//! - Soft misses (missing parent, index out of bounds) are explicit
//!   `MutationOutcome`s, never errors

pub mod composite_id;
pub mod config;
pub mod context;
pub mod cosmos;
pub mod errors;
pub mod memory;
pub mod store;
pub mod virtual_array;

use std::future::Future;
use std::pin::Pin;

pub use composite_id::{make_composite_id, CompositeId};
pub use config::{CosmosCollectionConfig, VirtualCollectionConfig};
pub use context::Caller;
pub use cosmos::CosmosCollection;
pub use errors::{CollectionError, CollectionResult, StoreError};
pub use memory::InMemoryCollection;
pub use store::DocumentStore;
pub use virtual_array::{MutationOutcome, TargetOutcome, VirtualArrayCollection};

use crate::document::Record;
use crate::query::{AggregateResult, Aggregation, Filter};

/// Boxed future returned by collection operations
pub type CollectionFuture<'a, T> = Pin<Box<dyn Future<Output = CollectionResult<T>> + Send + 'a>>;

/// Collection contract consumed by the host agent
pub trait DocumentCollection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// List records matching the filter
    fn list<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        projection: Option<&'a [String]>,
    ) -> CollectionFuture<'a, Vec<Record>>;

    /// Create records, returning them as stored
    fn create<'a>(
        &'a self,
        caller: &'a Caller,
        records: Vec<Record>,
    ) -> CollectionFuture<'a, Vec<Record>>;

    /// Apply a patch to every record matching the filter
    fn update<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        patch: &'a Record,
    ) -> CollectionFuture<'a, ()>;

    /// Delete every record matching the filter
    fn delete<'a>(&'a self, caller: &'a Caller, filter: &'a Filter) -> CollectionFuture<'a, ()>;

    /// Aggregate records matching the filter
    fn aggregate<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        aggregation: &'a Aggregation,
        limit: Option<usize>,
    ) -> CollectionFuture<'a, Vec<AggregateResult>>;

    /// Lists records on behalf of a virtual collection built over this one.
    ///
    /// The child applies its own filter, pagination and guardrails, so
    /// implementations may skip caller-facing guardrails here.
    fn list_for_child<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        projection: Option<&'a [String]>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        self.list(caller, filter, projection)
    }

    /// Called when a field of this collection's records is exposed as a
    /// virtual collection of its own
    fn register_virtual_field(&self, _field_path: &str) {}
}
