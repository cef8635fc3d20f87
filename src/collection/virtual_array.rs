//! Virtual array collections
//!
//! Exposes an array-valued field of a parent collection's documents as a
//! collection of its own. Each array element becomes a record addressed by
//! a composite id (`parentId:index`) and tagged with its parent id.
//!
//! The collection owns no data. Reads fetch parent documents and run the
//! filter, sort and pagination locally; writes fetch the parent, mutate
//! the array and write the whole array back through the parent's `update`.
//! The parent may itself be a virtual collection, so the read-modify-write
//! chain recurses until it reaches a physical collection.
//!
//! Only object items are exposed. Scalar or nested-array items (`tags:
//! ["a", "b"]`) produce no records, so they cannot be listed, updated or
//! deleted through the virtual collection; mutations report them as
//! `IndexOutOfBounds`. Their positions still count toward the composite
//! index of later object items.
//!
//! # Guardrails
//!
//! The row cap and the scan warnings apply to the public `list` only.
//! Reads issued for a child collection, for mutation target resolution
//! and for counts materialize the full match set without them.
//!
//! # Consistency
//!
//! Writes against the same parent are not coordinated. There is no version
//! check between the fetch and the write back: concurrent mutations of one
//! parent array are last-write-wins.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use super::composite_id::{make_composite_id, CompositeId};
use super::config::VirtualCollectionConfig;
use super::context::Caller;
use super::errors::{CollectionError, CollectionResult};
use super::{CollectionFuture, DocumentCollection};
use crate::document::{
    get_record_path, project_record, remove_record_path, set_record_path, top_level,
    unflatten_record, Record,
};
use crate::executor::{paginate, PredicateFilter, ResultSorter};
use crate::query::{
    AggregateOperation, AggregateResult, Aggregation, Aggregator, ConditionLeaf, ConditionTree,
    FieldValidator, Filter, Operator, Page, QueryResult,
};

/// What happened to one mutation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The item was updated or removed
    Applied,
    /// The parent document does not exist; nothing was written
    ParentNotFound,
    /// The parent exists but has no object item at that index; nothing was written
    IndexOutOfBounds,
}

/// Outcome of a mutation for one composite id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub id: CompositeId,
    pub outcome: MutationOutcome,
}

impl TargetOutcome {
    fn new(id: CompositeId, outcome: MutationOutcome) -> Self {
        Self { id, outcome }
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == MutationOutcome::Applied
    }
}

/// Whether a list applies the caller-facing guardrails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guardrails {
    /// Public `list`: scan warnings and the unpaginated row cap apply
    Enforced,
    /// Internal reads on behalf of a child collection, a mutation or a count
    Skipped,
}

/// Collection view over an array field of a parent collection
pub struct VirtualArrayCollection {
    name: String,
    parent: Weak<dyn DocumentCollection>,
    field_path: String,
    config: VirtualCollectionConfig,
    /// Fields of this collection's items virtualized one level further down
    virtualized_child_fields: RwLock<HashSet<String>>,
}

impl VirtualArrayCollection {
    /// Create a virtual collection over `field_path` of the parent's
    /// documents. The parent is held weakly.
    pub fn new(
        name: impl Into<String>,
        parent: Arc<dyn DocumentCollection>,
        field_path: impl Into<String>,
        config: VirtualCollectionConfig,
    ) -> CollectionResult<Self> {
        let field_path = field_path.into();
        FieldValidator::validate(&field_path)?;
        parent.register_virtual_field(&field_path);

        Ok(Self {
            name: name.into(),
            parent: Arc::downgrade(&parent),
            field_path,
            config,
            virtualized_child_fields: RwLock::new(HashSet::new()),
        })
    }

    /// Path of the virtualized array inside parent documents
    pub fn field_path(&self) -> &str {
        &self.field_path
    }

    pub fn config(&self) -> &VirtualCollectionConfig {
        &self.config
    }

    fn parent(&self) -> CollectionResult<Arc<dyn DocumentCollection>> {
        self.parent
            .upgrade()
            .ok_or_else(|| CollectionError::ParentUnavailable {
                collection: self.name.clone(),
            })
    }

    // ========================================================================
    // Target analysis
    // ========================================================================

    /// Finds the exact composite ids a condition tree addresses.
    ///
    /// Matches an Equal/In leaf on the id field, alone or inside an And whose
    /// other children are Equal/In leaves on the parent id field. Parent id
    /// leaves only narrow the id set. Any other shape returns `None`.
    fn pinpoint(&self, tree: Option<&ConditionTree>) -> QueryResult<Option<Vec<CompositeId>>> {
        let leaves: Vec<&ConditionLeaf> = match tree {
            Some(ConditionTree::Leaf(leaf)) => vec![leaf],
            Some(ConditionTree::Branch(branch)) if branch.aggregator == Aggregator::And => {
                match branch
                    .conditions
                    .iter()
                    .map(ConditionTree::as_leaf)
                    .collect::<Option<Vec<_>>>()
                {
                    Some(leaves) if !leaves.is_empty() => leaves,
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };

        let mut ids: Option<Vec<CompositeId>> = None;
        let mut allowed_parents: Option<HashSet<String>> = None;

        for leaf in leaves {
            let values = match membership_values(leaf) {
                Some(values) => values,
                None => return Ok(None),
            };

            if leaf.field == self.config.id_field {
                if ids.is_some() {
                    return Ok(None);
                }
                let raw = match values.iter().map(|v| v.as_str()).collect::<Option<Vec<_>>>() {
                    Some(raw) => raw,
                    None => return Ok(None),
                };
                ids = Some(
                    raw.into_iter()
                        .map(CompositeId::parse)
                        .collect::<QueryResult<Vec<_>>>()?,
                );
            } else if leaf.field == self.config.parent_id_field {
                let parents: HashSet<String> = values.iter().filter_map(|v| id_string(v)).collect();
                allowed_parents = Some(match allowed_parents {
                    Some(previous) => previous.intersection(&parents).cloned().collect(),
                    None => parents,
                });
            } else {
                return Ok(None);
            }
        }

        Ok(ids.map(|ids| match &allowed_parents {
            Some(allowed) => ids
                .into_iter()
                .filter(|id| allowed.contains(&id.parent_id))
                .collect(),
            None => ids,
        }))
    }

    /// Parent ids a scan can be narrowed to, from a parent id leaf at the
    /// top level or directly under an And
    fn parent_hint(&self, tree: Option<&ConditionTree>) -> Option<Vec<Value>> {
        let candidates: Vec<&ConditionLeaf> = match tree? {
            ConditionTree::Leaf(leaf) => vec![leaf],
            ConditionTree::Branch(branch) if branch.aggregator == Aggregator::And => branch
                .conditions
                .iter()
                .filter_map(ConditionTree::as_leaf)
                .collect(),
            ConditionTree::Branch(_) => return None,
        };

        candidates
            .into_iter()
            .filter(|leaf| leaf.field == self.config.parent_id_field)
            .find_map(membership_values)
            .map(|values| values.into_iter().cloned().collect())
    }

    /// Composite ids a mutation applies to
    async fn resolve_targets(
        &self,
        caller: &Caller,
        filter: &Filter,
    ) -> CollectionResult<Vec<CompositeId>> {
        if let Some(ids) = self.pinpoint(filter.condition_tree.as_ref())? {
            return Ok(ids);
        }

        let projection = vec![self.config.id_field.clone()];
        let records = self
            .list_records(caller, filter, Some(&projection), Guardrails::Skipped)
            .await?;

        records
            .iter()
            .map(|record| {
                let id = record
                    .get(&self.config.id_field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| CollectionError::InvalidRecord {
                        collection: self.name.clone(),
                        reason: format!("listed record without '{}'", self.config.id_field),
                    })?;
                Ok(CompositeId::parse(id)?)
            })
            .collect()
    }

    // ========================================================================
    // Parent access
    // ========================================================================

    fn parent_projection(&self) -> Vec<String> {
        vec![
            self.config.parent_primary_key.clone(),
            self.field_path.clone(),
        ]
    }

    fn parent_filter(&self, parent_id: &str) -> Filter {
        Filter::from_tree(ConditionTree::leaf(
            self.config.parent_primary_key.clone(),
            Operator::Equal,
            Value::String(parent_id.to_string()),
        ))
    }

    async fn fetch_parent(
        &self,
        parent: &dyn DocumentCollection,
        caller: &Caller,
        parent_id: &str,
    ) -> CollectionResult<Option<Record>> {
        let projection = self.parent_projection();
        let documents = parent
            .list_for_child(caller, &self.parent_filter(parent_id), Some(&projection))
            .await?;
        Ok(documents.into_iter().next())
    }

    async fn fetch_parents(
        &self,
        parent: &dyn DocumentCollection,
        caller: &Caller,
        hint: Option<Vec<Value>>,
    ) -> CollectionResult<Vec<Record>> {
        let filter = match hint {
            None => Filter::new(),
            Some(mut values) if values.len() == 1 => Filter::from_tree(ConditionTree::leaf(
                self.config.parent_primary_key.clone(),
                Operator::Equal,
                values.remove(0),
            )),
            Some(values) => Filter::from_tree(ConditionTree::leaf(
                self.config.parent_primary_key.clone(),
                Operator::In,
                Value::Array(values),
            )),
        };

        let projection = self.parent_projection();
        parent
            .list_for_child(caller, &filter, Some(&projection))
            .await
    }

    async fn write_back(
        &self,
        parent: &dyn DocumentCollection,
        caller: &Caller,
        parent_id: &str,
        items: Vec<Value>,
    ) -> CollectionResult<()> {
        let mut patch = Record::new();
        patch.insert(self.field_path.clone(), Value::Array(items));
        parent
            .update(caller, &self.parent_filter(parent_id), &patch)
            .await
    }

    fn items_of(&self, document: &Record) -> Vec<Value> {
        get_record_path(document, &self.field_path)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    // ========================================================================
    // Flattening
    // ========================================================================

    /// Child fields stripped from records unless the projection asks for them
    fn hidden_fields(&self, projection: Option<&[String]>) -> Vec<String> {
        let fields = match self.virtualized_child_fields.read() {
            Ok(fields) => fields.iter().cloned().collect::<Vec<_>>(),
            Err(_) => return Vec::new(),
        };

        fields
            .into_iter()
            .filter(|field| {
                !projection.map_or(false, |projected| {
                    projected
                        .iter()
                        .any(|p| p == field || top_level(p) == top_level(field))
                })
            })
            .collect()
    }

    /// Turns a parent's array items into records. `indices` restricts the
    /// extraction to those positions; out-of-range positions are skipped.
    fn extract(&self, document: &Record, indices: Option<&[usize]>, hidden: &[String]) -> Vec<Record> {
        let parent_value = match document.get(&self.config.parent_primary_key) {
            Some(value) => value,
            None => return Vec::new(),
        };
        let parent_id = match id_string(parent_value) {
            Some(id) => id,
            None => return Vec::new(),
        };
        let items = match get_record_path(document, &self.field_path) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        };

        let positions: Vec<usize> = match indices {
            Some(indices) => indices.to_vec(),
            None => (0..items.len()).collect(),
        };

        positions
            .into_iter()
            .filter_map(|index| match items.get(index) {
                Some(Value::Object(item)) => {
                    let mut record = item.clone();
                    for field in hidden {
                        remove_record_path(&mut record, field);
                    }
                    record.insert(
                        self.config.id_field.clone(),
                        Value::String(make_composite_id(&parent_id, index)),
                    );
                    record.insert(self.config.parent_id_field.clone(), parent_value.clone());
                    Some(record)
                }
                _ => None,
            })
            .collect()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    fn check_guardrails(
        &self,
        tree: Option<&ConditionTree>,
        page: Option<&Page>,
        rows: usize,
    ) -> CollectionResult<()> {
        if tree.is_none() && page.is_none() {
            tracing::warn!(
                event = "VIRTUAL_SCAN_RISK",
                collection = %self.name,
                rows,
                "listing without filter or pagination scans every parent document"
            );
        }

        if !page.map_or(false, Page::is_bounded) && rows > self.config.max_unpaginated_rows {
            return Err(CollectionError::ResultSetTooLarge {
                collection: self.name.clone(),
                rows,
                max: self.config.max_unpaginated_rows,
            });
        }

        if let Some(limit) = page.and_then(|p| p.limit) {
            if limit > self.config.large_page_warning {
                tracing::warn!(
                    event = "VIRTUAL_LARGE_PAGE",
                    collection = %self.name,
                    limit,
                    threshold = self.config.large_page_warning
                );
            }
        }

        Ok(())
    }

    async fn list_records(
        &self,
        caller: &Caller,
        filter: &Filter,
        projection: Option<&[String]>,
        guardrails: Guardrails,
    ) -> CollectionResult<Vec<Record>> {
        let parent = self.parent()?;
        let tree = filter.condition_tree.as_ref();
        let hidden = self.hidden_fields(projection);

        let mut records = match self.pinpoint(tree)? {
            Some(ids) => {
                let mut records = Vec::new();
                for (parent_id, indices) in group_by_parent(&ids) {
                    if let Some(document) = self.fetch_parent(&*parent, caller, &parent_id).await? {
                        records.extend(self.extract(&document, Some(indices.as_slice()), &hidden));
                    }
                }
                records
            }
            None => {
                let hint = self.parent_hint(tree);
                let documents = self.fetch_parents(&*parent, caller, hint).await?;
                let flattened = documents
                    .iter()
                    .flat_map(|document| self.extract(document, None, &hidden))
                    .collect();
                PredicateFilter::filter(flattened, tree)?
            }
        };

        if guardrails == Guardrails::Enforced {
            self.check_guardrails(tree, filter.page.as_ref(), records.len())?;
        }

        ResultSorter::sort(&mut records, &filter.sort);
        let records = paginate(records, filter.page.as_ref());

        Ok(records
            .into_iter()
            .map(|record| project_record(record, projection))
            .collect())
    }

    async fn create_records(
        &self,
        caller: &Caller,
        records: Vec<Record>,
    ) -> CollectionResult<Vec<Record>> {
        let parent = self.parent()?;
        let mut created = Vec::with_capacity(records.len());

        for record in records {
            let parent_id = record
                .get(&self.config.parent_id_field)
                .and_then(id_string)
                .ok_or_else(|| CollectionError::MissingParentId {
                    collection: self.name.clone(),
                    field: self.config.parent_id_field.clone(),
                })?;

            let document = self
                .fetch_parent(&*parent, caller, &parent_id)
                .await?
                .ok_or_else(|| CollectionError::ParentNotFound {
                    collection: self.name.clone(),
                    parent_id: parent_id.clone(),
                })?;

            let mut item = record.clone();
            item.remove(&self.config.parent_id_field);
            item.remove(&self.config.id_field);

            let mut items = self.items_of(&document);
            let index = items.len();
            items.push(Value::Object(unflatten_record(&item)));
            self.write_back(&*parent, caller, &parent_id, items).await?;

            let mut enriched = record;
            enriched.insert(
                self.config.id_field.clone(),
                Value::String(make_composite_id(&parent_id, index)),
            );
            created.push(enriched);
        }

        Ok(created)
    }

    /// Applies a patch to every item the filter addresses and reports the
    /// outcome per composite id
    pub async fn update_targets(
        &self,
        caller: &Caller,
        filter: &Filter,
        patch: &Record,
    ) -> CollectionResult<Vec<TargetOutcome>> {
        let mut patch = patch.clone();
        patch.remove(&self.config.parent_id_field);
        patch.remove(&self.config.id_field);
        if patch.is_empty() {
            return Ok(Vec::new());
        }

        let parent = self.parent()?;
        let targets = self.resolve_targets(caller, filter).await?;
        let mut outcomes = Vec::with_capacity(targets.len());

        for (parent_id, indices) in group_by_parent(&targets) {
            let document = match self.fetch_parent(&*parent, caller, &parent_id).await? {
                Some(document) => document,
                None => {
                    outcomes.extend(self.skipped(&parent_id, &indices, MutationOutcome::ParentNotFound));
                    continue;
                }
            };

            let mut items = self.items_of(&document);
            let mut applied = false;
            for index in indices {
                let id = CompositeId::new(parent_id.clone(), index);
                match items.get_mut(index) {
                    Some(Value::Object(item)) => {
                        for (key, value) in &patch {
                            set_record_path(item, key, value.clone());
                        }
                        applied = true;
                        outcomes.push(TargetOutcome::new(id, MutationOutcome::Applied));
                    }
                    _ => outcomes.extend(self.skipped(
                        &parent_id,
                        &[index],
                        MutationOutcome::IndexOutOfBounds,
                    )),
                }
            }

            if applied {
                self.write_back(&*parent, caller, &parent_id, items).await?;
            }
        }

        Ok(outcomes)
    }

    /// Removes every item the filter addresses and reports the outcome per
    /// composite id. Refuses to run without a condition tree.
    pub async fn delete_targets(
        &self,
        caller: &Caller,
        filter: &Filter,
    ) -> CollectionResult<Vec<TargetOutcome>> {
        if filter.condition_tree.is_none() {
            return Err(CollectionError::EmptyDeleteFilter {
                collection: self.name.clone(),
            });
        }

        let parent = self.parent()?;
        let targets = self.resolve_targets(caller, filter).await?;
        let mut outcomes = Vec::with_capacity(targets.len());

        for (parent_id, mut indices) in group_by_parent(&targets) {
            let document = match self.fetch_parent(&*parent, caller, &parent_id).await? {
                Some(document) => document,
                None => {
                    outcomes.extend(self.skipped(&parent_id, &indices, MutationOutcome::ParentNotFound));
                    continue;
                }
            };

            // Highest index first so earlier removals don't shift later ones
            indices.sort_unstable_by(|a, b| b.cmp(a));

            let mut items = self.items_of(&document);
            let mut removed = false;
            for index in indices {
                if matches!(items.get(index), Some(Value::Object(_))) {
                    items.remove(index);
                    removed = true;
                    outcomes.push(TargetOutcome::new(
                        CompositeId::new(parent_id.clone(), index),
                        MutationOutcome::Applied,
                    ));
                } else {
                    outcomes.extend(self.skipped(
                        &parent_id,
                        &[index],
                        MutationOutcome::IndexOutOfBounds,
                    ));
                }
            }

            if removed {
                self.write_back(&*parent, caller, &parent_id, items).await?;
            }
        }

        Ok(outcomes)
    }

    fn skipped(
        &self,
        parent_id: &str,
        indices: &[usize],
        outcome: MutationOutcome,
    ) -> Vec<TargetOutcome> {
        indices
            .iter()
            .map(|&index| {
                let id = CompositeId::new(parent_id, index);
                tracing::debug!(
                    event = "VIRTUAL_TARGET_SKIPPED",
                    collection = %self.name,
                    id = %id,
                    outcome = ?outcome
                );
                TargetOutcome::new(id, outcome)
            })
            .collect()
    }

    async fn count(
        &self,
        caller: &Caller,
        filter: &Filter,
        aggregation: &Aggregation,
    ) -> CollectionResult<Vec<AggregateResult>> {
        if aggregation.operation != AggregateOperation::Count {
            return Err(CollectionError::OperationNotSupported {
                collection: self.name.clone(),
                operation: format!("{} aggregation", aggregation.operation.as_sql()),
            });
        }
        if !aggregation.groups.is_empty() {
            return Err(CollectionError::OperationNotSupported {
                collection: self.name.clone(),
                operation: "grouped aggregation".to_string(),
            });
        }

        let records = self
            .list_records(caller, filter, None, Guardrails::Skipped)
            .await?;
        Ok(vec![AggregateResult {
            value: Value::from(records.len()),
            group: Default::default(),
        }])
    }
}

impl DocumentCollection for VirtualArrayCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn list<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        projection: Option<&'a [String]>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(self.list_records(caller, filter, projection, Guardrails::Enforced))
    }

    fn list_for_child<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        projection: Option<&'a [String]>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(self.list_records(caller, filter, projection, Guardrails::Skipped))
    }

    fn create<'a>(
        &'a self,
        caller: &'a Caller,
        records: Vec<Record>,
    ) -> CollectionFuture<'a, Vec<Record>> {
        Box::pin(self.create_records(caller, records))
    }

    fn update<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        patch: &'a Record,
    ) -> CollectionFuture<'a, ()> {
        Box::pin(async move {
            self.update_targets(caller, filter, patch).await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, caller: &'a Caller, filter: &'a Filter) -> CollectionFuture<'a, ()> {
        Box::pin(async move {
            self.delete_targets(caller, filter).await?;
            Ok(())
        })
    }

    fn aggregate<'a>(
        &'a self,
        caller: &'a Caller,
        filter: &'a Filter,
        aggregation: &'a Aggregation,
        _limit: Option<usize>,
    ) -> CollectionFuture<'a, Vec<AggregateResult>> {
        Box::pin(self.count(caller, filter, aggregation))
    }

    fn register_virtual_field(&self, field_path: &str) {
        if let Ok(mut fields) = self.virtualized_child_fields.write() {
            fields.insert(field_path.to_string());
        }
    }
}

/// Values an Equal or In leaf admits; `None` for any other leaf
fn membership_values(leaf: &ConditionLeaf) -> Option<Vec<&Value>> {
    match (leaf.operator, &leaf.value) {
        (Operator::Equal, Value::Null) | (Operator::Equal, Value::Array(_)) => None,
        (Operator::Equal, value) => Some(vec![value]),
        (Operator::In, Value::Array(values)) => Some(values.iter().collect()),
        (Operator::In, Value::Null) => None,
        (Operator::In, value) => Some(vec![value]),
        _ => None,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Groups composite ids by parent in first-seen order, dropping duplicate
/// indices
fn group_by_parent(ids: &[CompositeId]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for id in ids {
        match groups.iter_mut().find(|(parent_id, _)| *parent_id == id.parent_id) {
            Some((_, indices)) => {
                if !indices.contains(&id.index) {
                    indices.push(id.index);
                }
            }
            None => groups.push((id.parent_id.clone(), vec![id.index])),
        }
    }
    groups
}
