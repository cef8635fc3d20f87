//! Cosmos DB container collection
//!
//! Wires the condition compiler, the aggregation compiler and the partition
//! key extractor into the collection contract of a physical container.
//! Store failures are wrapped with the operation and collection name.

use serde_json::Value;
use uuid::Uuid;

use super::config::CosmosCollectionConfig;
use super::context::Caller;
use super::errors::{CollectionError, CollectionResult};
use super::store::DocumentStore;
use super::{CollectionFuture, DocumentCollection};
use crate::document::{get_record_path, set_record_path, unflatten_record, Record};
use crate::query::{
    AggregateResult, Aggregation, AggregationCompiler, ConditionCompiler, Filter,
    PartitionKeyExtractor, PartitionKeyValue,
};

/// A collection backed by one Cosmos DB container
pub struct CosmosCollection<S: DocumentStore> {
    config: CosmosCollectionConfig,
    /// Partition key path in arrow form
    partition_field: String,
    store: S,
    conditions: ConditionCompiler,
    aggregations: AggregationCompiler,
}

impl<S: DocumentStore> CosmosCollection<S> {
    /// Create a collection over a container client
    pub fn new(config: CosmosCollectionConfig, store: S) -> Self {
        let partition_field = PartitionKeyExtractor::normalize_path(&config.partition_key_path);
        Self {
            config,
            partition_field,
            store,
            conditions: ConditionCompiler::new(),
            aggregations: AggregationCompiler::new(),
        }
    }

    /// Returns the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CosmosCollectionConfig {
        &self.config
    }

    fn routing_key(&self, filter: &Filter) -> Option<PartitionKeyValue> {
        PartitionKeyExtractor::extract(
            filter.condition_tree.as_ref(),
            &self.config.partition_key_path,
        )
    }

    fn document_key(&self, document: &Record) -> Option<PartitionKeyValue> {
        get_record_path(document, &self.partition_field).and_then(PartitionKeyValue::from_json)
    }

    fn to_record(&self, row: Value) -> CollectionResult<Record> {
        match row {
            Value::Object(record) => Ok(record),
            other => Err(CollectionError::InvalidRecord {
                collection: self.config.name.clone(),
                reason: format!("expected an object row, got {}", other),
            }),
        }
    }

    /// Fetches full documents matching the filter's condition tree
    async fn matching_documents(
        &self,
        operation: &str,
        filter: &Filter,
        projection: Option<&[String]>,
    ) -> CollectionResult<Vec<Record>> {
        let spec =
            self.conditions
                .compile_full(filter.condition_tree.as_ref(), &[], projection)?;
        let partition_key = self.routing_key(filter);

        let rows = self
            .store
            .query(&spec, partition_key.as_ref())
            .await
            .map_err(|e| CollectionError::store(operation, &self.config.name, e))?;

        rows.into_iter().map(|row| self.to_record(row)).collect()
    }
}

impl<S: DocumentStore> DocumentCollection for CosmosCollection<S> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn list<'a>(
        &'a self,
        _caller: &'a Caller,
        filter: &'a Filter,
        projection: Option<&'a [String]>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let tree = filter.condition_tree.as_ref();
            let mut spec = self.conditions.compile_full(tree, &filter.sort, projection)?;

            // Cosmos needs OFFSET and LIMIT together; an unbounded skip is
            // applied to the returned rows instead
            let mut local_skip = 0;
            if let Some(page) = &filter.page {
                match page.limit {
                    Some(limit) => {
                        spec.text
                            .push_str(&format!(" OFFSET {} LIMIT {}", page.skip, limit));
                    }
                    None => local_skip = page.skip,
                }
            }

            let partition_key = self.routing_key(filter);
            tracing::debug!(
                event = "COLLECTION_LIST",
                collection = %self.config.name,
                single_partition = partition_key.is_some()
            );

            let rows = self
                .store
                .query(&spec, partition_key.as_ref())
                .await
                .map_err(|e| CollectionError::store("list", &self.config.name, e))?;

            rows.into_iter()
                .skip(local_skip)
                .map(|row| self.to_record(row))
                .collect()
        })
    }

    fn create<'a>(
        &'a self,
        _caller: &'a Caller,
        records: Vec<Record>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let mut created = Vec::with_capacity(records.len());

            for record in records {
                let mut document = unflatten_record(&record);
                let has_id = document
                    .get(&self.config.primary_key)
                    .map_or(false, |id| !id.is_null());
                if !has_id {
                    document.insert(
                        self.config.primary_key.clone(),
                        Value::String(Uuid::new_v4().to_string()),
                    );
                }

                let partition_key = self.document_key(&document);
                let stored = self
                    .store
                    .upsert_item(Value::Object(document), partition_key)
                    .await
                    .map_err(|e| CollectionError::store("create", &self.config.name, e))?;
                created.push(self.to_record(stored)?);
            }

            Ok(created)
        })
    }

    fn update<'a>(
        &'a self,
        _caller: &'a Caller,
        filter: &'a Filter,
        patch: &'a Record,
    ) -> CollectionFuture<'a, ()> {
        Box::pin(async move {
            let documents = self.matching_documents("update", filter, None).await?;

            for mut document in documents {
                for (key, value) in patch {
                    // Identity and partition placement are immutable
                    if *key == self.config.primary_key || *key == self.partition_field {
                        continue;
                    }
                    set_record_path(&mut document, key, value.clone());
                }

                let partition_key = self.document_key(&document);
                self.store
                    .upsert_item(Value::Object(document), partition_key)
                    .await
                    .map_err(|e| CollectionError::store("update", &self.config.name, e))?;
            }

            Ok(())
        })
    }

    fn delete<'a>(&'a self, _caller: &'a Caller, filter: &'a Filter) -> CollectionFuture<'a, ()> {
        Box::pin(async move {
            let mut projection = vec![self.config.primary_key.clone()];
            if self.partition_field != self.config.primary_key {
                projection.push(self.partition_field.clone());
            }

            let documents = self
                .matching_documents("delete", filter, Some(&projection))
                .await?;

            for document in documents {
                let id = document
                    .get(&self.config.primary_key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| CollectionError::InvalidRecord {
                        collection: self.config.name.clone(),
                        reason: format!("document without string '{}'", self.config.primary_key),
                    })?;

                let partition_key = self.document_key(&document);
                self.store
                    .delete_item(id, partition_key)
                    .await
                    .map_err(|e| CollectionError::store("delete", &self.config.name, e))?;
            }

            Ok(())
        })
    }

    fn aggregate<'a>(
        &'a self,
        _caller: &'a Caller,
        filter: &'a Filter,
        aggregation: &'a Aggregation,
        limit: Option<usize>,
    ) -> CollectionFuture<'a, Vec<AggregateResult>> {
        Box::pin(async move {
            let spec =
                self.aggregations
                    .compile(aggregation, filter.condition_tree.as_ref(), limit)?;
            let partition_key = self.routing_key(filter);

            let rows = self
                .store
                .query(&spec, partition_key.as_ref())
                .await
                .map_err(|e| CollectionError::store("aggregate", &self.config.name, e))?;

            Ok(AggregationCompiler::post_process(&rows, aggregation))
        })
    }
}
