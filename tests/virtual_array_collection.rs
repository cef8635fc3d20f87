//! Virtual Array Collection Tests
//!
//! End-to-end behavior of array fields exposed as collections:
//! - Composite id addressing and deletes
//! - Soft misses (out of bounds, missing parent) as no-ops
//! - Unpaginated result size guardrail
//! - Guardrail warnings emitted through `tracing`
//! - Read-modify-write through nested virtual collections

use std::io;
use std::sync::{Arc, Mutex};

use cosmos_collections::collection::{
    Caller, DocumentCollection, InMemoryCollection, MutationOutcome, VirtualArrayCollection,
    VirtualCollectionConfig,
};
use cosmos_collections::document::Record;
use cosmos_collections::query::{ConditionTree, Filter, Operator, Page, SortClause};
use serde_json::{json, Value};
use tracing_subscriber::fmt::MakeWriter;

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn id_equal(id: &str) -> Filter {
    Filter::from_tree(ConditionTree::leaf("id", Operator::Equal, json!(id)))
}

fn virtual_items(parent: Arc<dyn DocumentCollection>, field: &str) -> VirtualArrayCollection {
    VirtualArrayCollection::new(
        format!("{}_{}", parent.name(), field),
        parent,
        field,
        VirtualCollectionConfig::default(),
    )
    .unwrap()
}

fn parent_with_items(count: usize) -> Arc<InMemoryCollection> {
    let items: Vec<Value> = (0..count).map(|i| json!({"n": i})).collect();
    Arc::new(InMemoryCollection::new("orders").with_documents(vec![json!({"id": "p", "items": items})]))
}

// =============================================================================
// Deletes by Composite Id
// =============================================================================

/// Deleting p:0 and p:2 from three items keeps the item originally at 1.
#[tokio::test]
async fn test_delete_multiple_indices_same_parent() {
    let orders = Arc::new(InMemoryCollection::new("orders").with_documents(vec![json!({
        "id": "p",
        "items": [{"sku": "A"}, {"sku": "B"}, {"sku": "C"}]
    })]));
    let items = virtual_items(orders.clone(), "items");
    let filter = Filter::from_tree(ConditionTree::leaf("id", Operator::In, json!(["p:0", "p:2"])));

    let outcomes = items.delete_targets(&Caller::default(), &filter).await.unwrap();

    assert!(outcomes.iter().all(|o| o.is_applied()));
    assert_eq!(orders.get("p").unwrap().unwrap()["items"], json!([{"sku": "B"}]));
    assert_eq!(orders.update_count(), 1);
}

/// Out-of-bounds delete after a successful one leaves the parent unchanged.
#[tokio::test]
async fn test_delete_then_out_of_bounds_is_noop() {
    let orders = Arc::new(InMemoryCollection::new("orders").with_documents(vec![json!({
        "id": "o1",
        "items": [{"sku": "A"}, {"sku": "B"}]
    })]));
    let items = virtual_items(orders.clone(), "items");
    let caller = Caller::default();

    items.delete(&caller, &id_equal("o1:0")).await.unwrap();
    assert_eq!(orders.get("o1").unwrap().unwrap()["items"], json!([{"sku": "B"}]));
    assert_eq!(orders.update_count(), 1);

    let outcomes = items.delete_targets(&caller, &id_equal("o1:5")).await.unwrap();
    assert_eq!(outcomes[0].outcome, MutationOutcome::IndexOutOfBounds);
    assert_eq!(orders.get("o1").unwrap().unwrap()["items"], json!([{"sku": "B"}]));
    assert_eq!(orders.update_count(), 1);
}

/// Deleting under a parent that does not exist is a no-op.
#[tokio::test]
async fn test_delete_missing_parent_is_noop() {
    let orders = parent_with_items(2);
    let items = virtual_items(orders.clone(), "items");

    let outcomes = items
        .delete_targets(&Caller::default(), &id_equal("ghost:0"))
        .await
        .unwrap();
    assert_eq!(outcomes[0].outcome, MutationOutcome::ParentNotFound);
    assert_eq!(orders.update_count(), 0);
}

/// Deletes through the general path resolve targets by listing.
#[tokio::test]
async fn test_delete_by_predicate() {
    let orders = parent_with_items(6);
    let items = virtual_items(orders.clone(), "items");
    let filter = Filter::from_tree(ConditionTree::leaf("n", Operator::GreaterThan, json!(3)));

    items.delete(&Caller::default(), &filter).await.unwrap();

    assert_eq!(
        orders.get("p").unwrap().unwrap()["items"],
        json!([{"n": 0}, {"n": 1}, {"n": 2}, {"n": 3}])
    );
}

// =============================================================================
// Result Size Guardrail
// =============================================================================

#[tokio::test]
async fn test_unpaginated_list_over_cap_fails() {
    let orders = parent_with_items(1250);
    let items = virtual_items(orders.clone(), "items");

    let err = items
        .list(&Caller::default(), &Filter::new(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "COSMOS_RESULT_SET_TOO_LARGE");
    assert!(err.to_string().contains("too large"));
}

#[tokio::test]
async fn test_unpaginated_list_at_cap_succeeds() {
    let orders = parent_with_items(1000);
    let items = virtual_items(orders.clone(), "items");

    let records = items
        .list(&Caller::default(), &Filter::new(), None)
        .await
        .unwrap();
    assert_eq!(records.len(), 1000);
}

#[tokio::test]
async fn test_unpaginated_list_one_over_cap_fails() {
    let orders = parent_with_items(1001);
    let items = virtual_items(orders.clone(), "items");

    let err = items
        .list(&Caller::default(), &Filter::new(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "COSMOS_RESULT_SET_TOO_LARGE");
}

/// Pagination bounds the result, so large arrays can still be paged.
#[tokio::test]
async fn test_paginated_list_over_cap_succeeds() {
    let orders = parent_with_items(1250);
    let items = virtual_items(orders.clone(), "items");
    let filter = Filter::new()
        .with_sort(SortClause::desc("n"))
        .with_page(Page::new(10, 5));

    let records = items.list(&Caller::default(), &filter, None).await.unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["n"], json!(1239));
}

// =============================================================================
// Nested Virtual Collections
// =============================================================================

fn nested_fixture() -> (
    Arc<InMemoryCollection>,
    Arc<VirtualArrayCollection>,
    VirtualArrayCollection,
) {
    let orders = Arc::new(InMemoryCollection::new("orders").with_documents(vec![json!({
        "id": "root",
        "lines": [
            {"sku": "A", "parts": [{"code": "a1"}, {"code": "a2"}, {"code": "a3"}]},
            {"sku": "B", "parts": [{"code": "b1"}]}
        ]
    })]));
    let lines = Arc::new(virtual_items(orders.clone(), "lines"));
    let parts = virtual_items(lines.clone(), "parts");
    (orders, lines, parts)
}

#[tokio::test]
async fn test_nested_list_composes_ids() {
    let (_orders, lines, parts) = nested_fixture();
    let caller = Caller::default();

    let records = parts.list(&caller, &Filter::new(), None).await.unwrap();
    let ids: Vec<&str> = records.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["root:0:0", "root:0:1", "root:0:2", "root:1:0"]);
    assert_eq!(records[3]["parentId"], json!("root:1"));

    // Virtualized children are hidden from the intermediate level
    let line_records = lines.list(&caller, &Filter::new(), None).await.unwrap();
    assert!(line_records[0].get("parts").is_none());
}

/// A delete three levels down walks up through every parent's update.
#[tokio::test]
async fn test_nested_delete_writes_through_to_root() {
    let (orders, _lines, parts) = nested_fixture();

    parts
        .delete(&Caller::default(), &id_equal("root:0:1"))
        .await
        .unwrap();

    let root = orders.get("root").unwrap().unwrap();
    assert_eq!(
        root["lines"],
        json!([
            {"sku": "A", "parts": [{"code": "a1"}, {"code": "a3"}]},
            {"sku": "B", "parts": [{"code": "b1"}]}
        ])
    );
}

#[tokio::test]
async fn test_nested_create_and_update() {
    let (orders, _lines, parts) = nested_fixture();
    let caller = Caller::default();

    let created = parts
        .create(&caller, vec![record(json!({"parentId": "root:1", "code": "b2"}))])
        .await
        .unwrap();
    assert_eq!(created[0]["id"], json!("root:1:1"));

    parts
        .update(&caller, &id_equal("root:1:1"), &record(json!({"code": "b2x"})))
        .await
        .unwrap();

    let root = orders.get("root").unwrap().unwrap();
    assert_eq!(root["lines"][1]["parts"], json!([{"code": "b1"}, {"code": "b2x"}]));
    assert_eq!(root["lines"][0]["sku"], json!("A"));
}

/// Intermediate level larger than the row cap, read through a paginated
/// grandchild list and a predicate delete.
fn wide_nested_fixture() -> (Arc<InMemoryCollection>, Arc<VirtualArrayCollection>, VirtualArrayCollection) {
    let lines: Vec<Value> = (0..1200)
        .map(|i| json!({"line": i, "parts": [{"code": format!("p{}", i)}]}))
        .collect();
    let orders = Arc::new(
        InMemoryCollection::new("orders").with_documents(vec![json!({"id": "root", "lines": lines})]),
    );
    let lines = Arc::new(virtual_items(orders.clone(), "lines"));
    let parts = virtual_items(lines.clone(), "parts");
    (orders, lines, parts)
}

/// The row cap applies to the caller's request, not to parent reads.
#[tokio::test]
async fn test_nested_paginated_list_over_wide_parent() {
    let (_orders, lines, parts) = wide_nested_fixture();
    let caller = Caller::default();

    let records = parts
        .list(&caller, &Filter::new().with_page(Page::new(0, 5)), None)
        .await
        .unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["id"], json!("root:0:0"));

    // The wide level itself still enforces the cap on unpaginated lists
    let err = lines.list(&caller, &Filter::new(), None).await.unwrap_err();
    assert_eq!(err.code(), "COSMOS_RESULT_SET_TOO_LARGE");
}

#[tokio::test]
async fn test_nested_delete_over_wide_parent() {
    let (orders, _lines, parts) = wide_nested_fixture();
    let filter = Filter::from_tree(ConditionTree::leaf("code", Operator::Equal, json!("p3")));

    parts.delete(&Caller::default(), &filter).await.unwrap();

    let root = orders.get("root").unwrap().unwrap();
    assert_eq!(root["lines"][3]["parts"], json!([]));
    assert_eq!(root["lines"][4]["parts"], json!([{"code": "p4"}]));
}

// =============================================================================
// Guardrail Warnings
// =============================================================================

/// Shared buffer collecting formatted log lines
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture_warnings() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

#[tokio::test]
async fn test_scan_risk_warning() {
    let (logs, _guard) = capture_warnings();
    let orders = parent_with_items(3);
    let items = virtual_items(orders.clone(), "items");

    items
        .list(&Caller::default(), &Filter::new(), None)
        .await
        .unwrap();
    assert!(logs.contents().contains("VIRTUAL_SCAN_RISK"));
}

#[tokio::test]
async fn test_filtered_list_has_no_scan_warning() {
    let (logs, _guard) = capture_warnings();
    let orders = parent_with_items(3);
    let items = virtual_items(orders.clone(), "items");
    let filter = Filter::from_tree(ConditionTree::leaf("n", Operator::Equal, json!(1)));

    items.list(&Caller::default(), &filter, None).await.unwrap();
    assert!(!logs.contents().contains("VIRTUAL_SCAN_RISK"));
}

/// A large page only warns; the rows are still returned.
#[tokio::test]
async fn test_large_page_warns_without_failing() {
    let (logs, _guard) = capture_warnings();
    let orders = parent_with_items(700);
    let items = virtual_items(orders.clone(), "items");

    let records = items
        .list(&Caller::default(), &Filter::new().with_page(Page::new(0, 600)), None)
        .await
        .unwrap();

    assert_eq!(records.len(), 600);
    let output = logs.contents();
    assert!(output.contains("VIRTUAL_LARGE_PAGE"));
    assert!(!output.contains("VIRTUAL_SCAN_RISK"));
}

/// Nested reads do not repeat the scan warning for the parent level.
#[tokio::test]
async fn test_nested_read_warns_once() {
    let (logs, _guard) = capture_warnings();
    let (_orders, _lines, parts) = nested_fixture();

    parts
        .list(&Caller::default(), &Filter::new(), None)
        .await
        .unwrap();
    assert_eq!(logs.contents().matches("VIRTUAL_SCAN_RISK").count(), 1);
}
