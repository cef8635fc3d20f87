//! In-memory collection
//!
//! A physical collection kept in process memory. Filters run through the
//! local executor with the same semantics the Cosmos compiler emits, which
//! makes it the parent of choice for exercising virtual collections.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use serde_json::{Map, Number, Value};
use uuid::Uuid;

use super::context::Caller;
use super::errors::{CollectionError, CollectionResult, StoreError};
use super::{CollectionFuture, DocumentCollection};
use crate::document::{get_record_path, project_record, set_record_path, unflatten_record, Record};
use crate::executor::{self, compare_scalars, values_equal, PredicateFilter};
use crate::query::{AggregateOperation, AggregateResult, Aggregation, Filter, QueryError};

/// Collection storing whole documents in a vector
pub struct InMemoryCollection {
    name: String,
    primary_key: String,
    documents: RwLock<Vec<Record>>,
    virtual_fields: RwLock<HashSet<String>>,
    updates: AtomicUsize,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            documents: RwLock::new(Vec::new()),
            virtual_fields: RwLock::new(HashSet::new()),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Seed the collection with documents
    pub fn with_documents(mut self, documents: impl IntoIterator<Item = Value>) -> Self {
        if let Ok(stored) = self.documents.get_mut() {
            stored.extend(documents.into_iter().filter_map(|doc| match doc {
                Value::Object(record) => Some(record),
                _ => None,
            }));
        }
        self
    }

    /// Snapshot of the stored documents
    pub fn documents(&self) -> CollectionResult<Vec<Record>> {
        let documents = self.documents.read().map_err(|e| self.lock_error("read", e))?;
        Ok(documents.clone())
    }

    /// Returns a stored document by primary key
    pub fn get(&self, id: &str) -> CollectionResult<Option<Record>> {
        let documents = self.documents.read().map_err(|e| self.lock_error("read", e))?;
        Ok(documents
            .iter()
            .find(|doc| doc.get(&self.primary_key).and_then(Value::as_str) == Some(id))
            .cloned())
    }

    /// Number of documents written by `update`
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Fields registered as virtual collections
    pub fn virtual_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .virtual_fields
            .read()
            .map(|fields| fields.iter().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }

    fn lock_error(&self, operation: &str, err: impl std::fmt::Display) -> CollectionError {
        CollectionError::store(operation, &self.name, StoreError::new(err.to_string()))
    }

    fn aggregate_records(
        &self,
        records: &[Record],
        aggregation: &Aggregation,
    ) -> CollectionResult<Value> {
        let field = match (&aggregation.field, aggregation.operation) {
            (_, AggregateOperation::Count) => return Ok(Value::from(records.len())),
            (Some(field), _) => field,
            (None, operation) => {
                return Err(QueryError::invalid_aggregation(format!(
                    "{} aggregation requires a field",
                    operation.as_sql()
                ))
                .into())
            }
        };

        let values: Vec<&Value> = records
            .iter()
            .filter_map(|record| get_record_path(record, field))
            .filter(|value| value.is_number())
            .collect();

        let value = match aggregation.operation {
            AggregateOperation::Sum => number(values.iter().filter_map(|v| v.as_f64()).sum()),
            AggregateOperation::Avg if values.is_empty() => Value::Null,
            AggregateOperation::Avg => {
                let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
                number(sum / values.len() as f64)
            }
            AggregateOperation::Max => extreme(&values, std::cmp::Ordering::Greater),
            AggregateOperation::Min => extreme(&values, std::cmp::Ordering::Less),
            AggregateOperation::Count => Value::from(records.len()),
        };
        Ok(value)
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn extreme(values: &[&Value], wanted: std::cmp::Ordering) -> Value {
    values
        .iter()
        .copied()
        .fold(None::<&Value>, |best, value| match best {
            Some(best) if compare_scalars(value, best) != Some(wanted) => Some(best),
            _ => Some(value),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

impl DocumentCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn list<'a>(
        &'a self,
        _caller: &'a Caller,
        filter: &'a Filter,
        projection: Option<&'a [String]>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let snapshot = self.documents()?;
            let records = executor::execute(snapshot, filter)?;
            Ok(records
                .into_iter()
                .map(|record| project_record(record, projection))
                .collect())
        })
    }

    fn create<'a>(
        &'a self,
        _caller: &'a Caller,
        records: Vec<Record>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let mut documents = self
                .documents
                .write()
                .map_err(|e| self.lock_error("create", e))?;

            let mut created = Vec::with_capacity(records.len());
            for record in records {
                let mut document = unflatten_record(&record);
                if document.get(&self.primary_key).map_or(true, Value::is_null) {
                    document.insert(
                        self.primary_key.clone(),
                        Value::String(Uuid::new_v4().to_string()),
                    );
                }
                documents.push(document.clone());
                created.push(document);
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
            let mut documents = self
                .documents
                .write()
                .map_err(|e| self.lock_error("update", e))?;

            let matched = documents
                .iter()
                .map(|document| match &filter.condition_tree {
                    Some(tree) => PredicateFilter::matches(document, tree),
                    None => Ok(true),
                })
                .collect::<Result<Vec<_>, _>>()?;

            for (document, _) in documents.iter_mut().zip(matched).filter(|(_, m)| *m) {
                for (key, value) in patch {
                    if *key != self.primary_key {
                        set_record_path(document, key, value.clone());
                    }
                }
                self.updates.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, _caller: &'a Caller, filter: &'a Filter) -> CollectionFuture<'a, ()> {
        Box::pin(async move {
            let tree = filter.condition_tree.as_ref().ok_or_else(|| {
                CollectionError::EmptyDeleteFilter {
                    collection: self.name.clone(),
                }
            })?;

            let mut documents = self
                .documents
                .write()
                .map_err(|e| self.lock_error("delete", e))?;

            let matched = documents
                .iter()
                .map(|document| PredicateFilter::matches(document, tree))
                .collect::<Result<Vec<_>, _>>()?;

            let mut matched = matched.into_iter();
            documents.retain(|_| !matched.next().unwrap_or(false));
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
            let records =
                PredicateFilter::filter(self.documents()?, filter.condition_tree.as_ref())?;

            let group = match aggregation.groups.as_slice() {
                [] => {
                    return Ok(vec![AggregateResult {
                        value: self.aggregate_records(&records, aggregation)?,
                        group: Map::new(),
                    }])
                }
                [group] if group.operation.is_none() => group,
                _ => {
                    return Err(QueryError::unsupported_aggregation(
                        "only a single plain group is supported",
                    )
                    .into())
                }
            };

            // Buckets in first-seen order, then sorted by key
            let mut buckets: Vec<(Value, Vec<Record>)> = Vec::new();
            for record in records {
                let key = get_record_path(&record, &group.field)
                    .cloned()
                    .unwrap_or(Value::Null);
                match buckets.iter_mut().find(|(k, _)| values_equal(k, &key)) {
                    Some((_, bucket)) => bucket.push(record),
                    None => buckets.push((key, vec![record])),
                }
            }
            buckets.sort_by(|(a, _), (b, _)| {
                compare_scalars(a, b).unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut results = Vec::with_capacity(buckets.len());
            for (key, bucket) in buckets.into_iter().take(limit.unwrap_or(usize::MAX)) {
                let mut group_values = Map::new();
                group_values.insert(group.field.clone(), key);
                results.push(AggregateResult {
                    value: self.aggregate_records(&bucket, aggregation)?,
                    group: group_values,
                });
            }
            Ok(results)
        })
    }

    fn register_virtual_field(&self, field_path: &str) {
        if let Ok(mut fields) = self.virtual_fields.write() {
            fields.insert(field_path.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{AggregationGroup, ConditionTree, Operator, SortClause};
    use serde_json::json;

    fn orders() -> InMemoryCollection {
        InMemoryCollection::new("orders").with_documents(vec![
            json!({"id": "o1", "status": "paid", "amount": 10, "address": {"city": "Paris"}}),
            json!({"id": "o2", "status": "open", "amount": 25, "address": {"city": "Lyon"}}),
            json!({"id": "o3", "status": "paid", "amount": 5}),
        ])
    }

    #[tokio::test]
    async fn test_list_filters_sorts_projects() {
        let orders = orders();
        let filter = Filter::from_tree(ConditionTree::leaf("status", Operator::Equal, json!("paid")))
            .with_sort(SortClause::desc("amount"));
        let projection = vec!["id".to_string()];

        let records = orders
            .list(&Caller::default(), &filter, Some(&projection))
            .await
            .unwrap();
        assert_eq!(
            records.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"id": "o1"}), json!({"id": "o3"})]
        );
    }

    #[tokio::test]
    async fn test_create_unflattens_and_assigns_id() {
        let orders = InMemoryCollection::new("orders");
        let record = json!({"address->city": "Nantes"}).as_object().cloned().unwrap();

        let created = orders.create(&Caller::default(), vec![record]).await.unwrap();
        assert!(created[0]["id"].is_string());
        assert_eq!(created[0]["address"], json!({"city": "Nantes"}));
        assert_eq!(orders.documents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_nested_patch() {
        let orders = orders();
        let filter = Filter::from_tree(ConditionTree::leaf("id", Operator::Equal, json!("o1")));
        let patch = json!({"address->zip": "75001"}).as_object().cloned().unwrap();

        orders.update(&Caller::default(), &filter, &patch).await.unwrap();

        let o1 = orders.get("o1").unwrap().unwrap();
        assert_eq!(o1["address"], json!({"city": "Paris", "zip": "75001"}));
        assert_eq!(orders.update_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_requires_condition() {
        let orders = orders();
        let err = orders.delete(&Caller::default(), &Filter::new()).await.unwrap_err();
        assert_eq!(err.code(), "COSMOS_EMPTY_DELETE_FILTER");

        let filter = Filter::from_tree(ConditionTree::leaf("status", Operator::Equal, json!("paid")));
        orders.delete(&Caller::default(), &filter).await.unwrap();
        assert_eq!(orders.documents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_sum_grouped() {
        let orders = orders();
        let aggregation = Aggregation::new(AggregateOperation::Sum, Some("amount"))
            .with_group(AggregationGroup::by("status"));

        let results = orders
            .aggregate(&Caller::default(), &Filter::new(), &aggregation, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].group["status"], json!("open"));
        assert_eq!(results[0].value, json!(25.0));
        assert_eq!(results[1].value, json!(15.0));
    }

    #[tokio::test]
    async fn test_aggregate_count_and_max() {
        let orders = orders();
        let count = orders
            .aggregate(&Caller::default(), &Filter::new(), &Aggregation::count(), None)
            .await
            .unwrap();
        assert_eq!(count[0].value, json!(3));

        let max = orders
            .aggregate(
                &Caller::default(),
                &Filter::new(),
                &Aggregation::new(AggregateOperation::Max, Some("amount")),
                None,
            )
            .await
            .unwrap();
        assert_eq!(max[0].value, json!(25));
    }

    #[test]
    fn test_register_virtual_field() {
        let orders = orders();
        orders.register_virtual_field("items");
        assert_eq!(orders.virtual_fields(), vec!["items".to_string()]);
    }
}
