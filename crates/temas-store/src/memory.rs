//! In-process document store with live query subscriptions.
//!
//! `MemoryStore` is the reference [`DocumentStore`] implementation. Documents
//! live behind an async `RwLock`, writes apply atomically per document with
//! their preconditions, and every applied write fans a complete recomputed
//! result set out to each live subscription the change is visible to. It is
//! also the test double for the repositories and panels: `disconnect_all`
//! severs every subscription so reconnect handling can be exercised, and the
//! write counter lets tests assert that rejected operations issued no write.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use temas_core::defaults::SNAPSHOT_CHANNEL_CAPACITY;
use temas_core::{
    DocSnapshot, DocSubscription, Document, DocumentStore, Error, Precondition, Query,
    QuerySnapshot, QuerySubscription, Result, SortOrder, WriteMode,
};

/// In-memory [`DocumentStore`] with push-on-change subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    channel_capacity: usize,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, BTreeMap<String, JsonValue>>,
    live_queries: HashMap<u64, LiveQuery>,
    doc_watches: HashMap<(String, String), DocWatch>,
    next_query_id: u64,
    writes: u64,
}

struct LiveQuery {
    query: Query,
    tx: broadcast::Sender<QuerySnapshot>,
    revision: u64,
}

struct DocWatch {
    tx: broadcast::Sender<DocSnapshot>,
    revision: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(SNAPSHOT_CHANNEL_CAPACITY)
    }

    /// Override the snapshot channel capacity (small capacities force the
    /// lagged path in tests).
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            channel_capacity: capacity,
        }
    }

    /// Number of writes applied so far (failed preconditions do not count).
    pub async fn write_count(&self) -> u64 {
        self.state.read().await.writes
    }

    /// Number of live query subscriptions still registered, after pruning
    /// subscriptions whose receivers have all been dropped.
    pub async fn live_query_count(&self) -> usize {
        let mut state = self.state.write().await;
        state.live_queries.retain(|_, lq| lq.tx.receiver_count() > 0);
        state.live_queries.len()
    }

    /// Number of live single-document watches, pruned the same way.
    pub async fn doc_watch_count(&self) -> usize {
        let mut state = self.state.write().await;
        state.doc_watches.retain(|_, w| w.tx.receiver_count() > 0);
        state.doc_watches.len()
    }

    /// Sever every live subscription without touching documents.
    ///
    /// Receivers observe a closed channel on their next `recv`, the same
    /// signal a dropped network connection would produce.
    pub async fn disconnect_all(&self) {
        let mut state = self.state.write().await;
        let dropped = state.live_queries.len() + state.doc_watches.len();
        state.live_queries.clear();
        state.doc_watches.clear();
        debug!(dropped, "all live subscriptions disconnected");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreState {
    /// Compute the full ordered result set of a query.
    fn evaluate(&self, query: &Query) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|coll| {
                coll.iter()
                    .filter(|(_, fields)| filter_matches(query, fields))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &query.sort {
            docs.sort_by(|a, b| {
                let av = a.fields.get(&sort.field).unwrap_or(&JsonValue::Null);
                let bv = b.fields.get(&sort.field).unwrap_or(&JsonValue::Null);
                let by_field = match sort.order {
                    SortOrder::Asc => compare_json(av, bv),
                    SortOrder::Desc => compare_json(bv, av),
                };
                // Tie-break on id so equal keys keep a stable display order
                by_field.then_with(|| a.id.cmp(&b.id))
            });
        }
        docs
    }

    /// Push one fresh snapshot to every subscription the change is visible
    /// to: live queries on the collection that matched the document before
    /// or after the write, and the document's own watch.
    fn fan_out(
        &mut self,
        collection: &str,
        id: &str,
        old: Option<&JsonValue>,
        new: Option<&JsonValue>,
    ) {
        self.live_queries.retain(|_, lq| lq.tx.receiver_count() > 0);

        let visible: Vec<u64> = self
            .live_queries
            .iter()
            .filter(|(_, lq)| {
                lq.query.collection == collection
                    && (old.is_some_and(|f| filter_matches(&lq.query, f))
                        || new.is_some_and(|f| filter_matches(&lq.query, f)))
            })
            .map(|(qid, _)| *qid)
            .collect();

        for qid in visible {
            let query = self.live_queries[&qid].query.clone();
            let docs = self.evaluate(&query);
            if let Some(lq) = self.live_queries.get_mut(&qid) {
                lq.revision += 1;
                trace!(
                    collection = %collection,
                    doc_id = %id,
                    revision = lq.revision,
                    doc_count = docs.len(),
                    "snapshot pushed"
                );
                let _ = lq.tx.send(QuerySnapshot {
                    docs,
                    revision: lq.revision,
                });
            }
        }

        self.doc_watches.retain(|_, w| w.tx.receiver_count() > 0);
        let key = (collection.to_string(), id.to_string());
        if let Some(watch) = self.doc_watches.get_mut(&key) {
            watch.revision += 1;
            let doc = new.map(|fields| Document::new(id, fields.clone()));
            let _ = watch.tx.send(DocSnapshot {
                doc,
                revision: watch.revision,
            });
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, query: Query) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        Ok(state.evaluate(&query))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        fields: JsonValue,
        mode: WriteMode,
        precondition: Precondition,
    ) -> Result<Document> {
        let incoming = ensure_object(fields)?;

        let mut state = self.state.write().await;
        let existing = state
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id))
            .cloned();
        check_precondition(existing.as_ref(), &precondition, collection, id)?;

        let new_fields = match (mode, existing.as_ref()) {
            (WriteMode::Merge, Some(current)) => {
                let mut merged = current.as_object().cloned().unwrap_or_default();
                for (key, value) in incoming {
                    merged.insert(key, value);
                }
                JsonValue::Object(merged)
            }
            _ => JsonValue::Object(incoming),
        };

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), new_fields.clone());
        state.writes += 1;
        state.fan_out(collection, id, existing.as_ref(), Some(&new_fields));

        debug!(collection = %collection, doc_id = %id, op = "put", "document written");
        Ok(Document::new(id, new_fields))
    }

    async fn create(&self, collection: &str, fields: JsonValue) -> Result<Document> {
        let mut incoming = ensure_object(fields)?;
        let id = Uuid::now_v7().to_string();
        incoming.insert("id".to_string(), JsonValue::String(id.clone()));
        let new_fields = JsonValue::Object(incoming);

        let mut state = self.state.write().await;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), new_fields.clone());
        state.writes += 1;
        state.fan_out(collection, &id, None, Some(&new_fields));

        debug!(collection = %collection, doc_id = %id, op = "create", "document created");
        Ok(Document::new(id, new_fields))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|coll| coll.remove(id));

        if let Some(old) = removed {
            state.writes += 1;
            state.fan_out(collection, id, Some(&old), None);
            debug!(collection = %collection, doc_id = %id, op = "delete", "document deleted");
        }
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<QuerySubscription> {
        let mut state = self.state.write().await;
        let docs = state.evaluate(&query);
        let (tx, updates) = broadcast::channel(self.channel_capacity);

        let qid = state.next_query_id;
        state.next_query_id += 1;
        state.live_queries.insert(
            qid,
            LiveQuery {
                query,
                tx,
                revision: 1,
            },
        );
        debug!(live_queries = state.live_queries.len(), "live query registered");

        Ok(QuerySubscription {
            initial: QuerySnapshot { docs, revision: 1 },
            updates,
        })
    }

    async fn subscribe_doc(&self, collection: &str, id: &str) -> Result<DocSubscription> {
        let mut state = self.state.write().await;
        let doc = state
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id))
            .map(|fields| Document::new(id, fields.clone()));

        let key = (collection.to_string(), id.to_string());
        let (updates, revision) = match state.doc_watches.get(&key) {
            // One channel per document; a later subscriber shares it and its
            // initial snapshot carries the revision the watch has reached
            Some(watch) if watch.tx.receiver_count() > 0 => {
                (watch.tx.subscribe(), watch.revision)
            }
            _ => {
                let (tx, rx) = broadcast::channel(self.channel_capacity);
                state.doc_watches.insert(key, DocWatch { tx, revision: 1 });
                (rx, 1)
            }
        };

        Ok(DocSubscription {
            initial: DocSnapshot { doc, revision },
            updates,
        })
    }
}

/// Documents are JSON objects; reject anything else before touching state.
fn ensure_object(fields: JsonValue) -> Result<JsonMap<String, JsonValue>> {
    match fields {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::Validation(format!(
            "document fields must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn check_precondition(
    existing: Option<&JsonValue>,
    precondition: &Precondition,
    collection: &str,
    id: &str,
) -> Result<()> {
    match precondition {
        Precondition::None => Ok(()),
        Precondition::MustExist => {
            if existing.is_some() {
                Ok(())
            } else {
                Err(Error::NotFound(format!("{}/{}", collection, id)))
            }
        }
        Precondition::MustNotExist => {
            if existing.is_none() {
                Ok(())
            } else {
                Err(Error::Conflict(format!(
                    "{}/{} already exists",
                    collection, id
                )))
            }
        }
        Precondition::FieldEquals(field, expected) => match existing {
            None => Err(Error::NotFound(format!("{}/{}", collection, id))),
            Some(fields) => {
                // An absent field compares as JSON null
                let current = fields.get(field).unwrap_or(&JsonValue::Null);
                if current == expected {
                    Ok(())
                } else {
                    Err(Error::Conflict(format!(
                        "{}/{} field '{}' changed since read",
                        collection, id, field
                    )))
                }
            }
        },
    }
}

fn filter_matches(query: &Query, fields: &JsonValue) -> bool {
    match &query.filter {
        None => true,
        Some(filter) => fields.get(&filter.field).unwrap_or(&JsonValue::Null) == &filter.value,
    }
}

/// Total order over JSON values: null < bool < number < string, with
/// arrays and objects ranked last and left to the id tie-break.
fn compare_json(a: &JsonValue, b: &JsonValue) -> CmpOrdering {
    let rank = |v: &JsonValue| match v {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    };

    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let xf = x.as_f64().unwrap_or(f64::NAN);
            let yf = y.as_f64().unwrap_or(f64::NAN);
            xf.total_cmp(&yf)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use temas_core::{FieldFilter, SortSpec};

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        let doc = store.get("leads", "l1").await.unwrap().unwrap();
        assert_eq!(doc.field("handle"), Some(&json!("ayse")));
    }

    #[tokio::test]
    async fn test_get_absent_returns_none() {
        let store = MemoryStore::new();
        assert!(store.get("leads", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_shot_query_filters_without_subscribing() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse", "status": "new"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();
        store
            .put(
                "leads",
                "l2",
                json!({"handle": "mehmet", "status": "follow_up"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        let hits = store
            .query(Query::all("leads").with_filter(FieldFilter::new("handle", json!("mehmet"))))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "l2");
        assert_eq!(store.live_query_count().await, 0);
    }

    #[tokio::test]
    async fn test_merge_keeps_unnamed_fields() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse", "status": "new"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        store
            .put(
                "leads",
                "l1",
                json!({"status": "appointment_set"}),
                WriteMode::Merge,
                Precondition::None,
            )
            .await
            .unwrap();

        let doc = store.get("leads", "l1").await.unwrap().unwrap();
        assert_eq!(doc.field("handle"), Some(&json!("ayse")));
        assert_eq!(doc.field("status"), Some(&json!("appointment_set")));
    }

    #[tokio::test]
    async fn test_replace_drops_unnamed_fields() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse", "status": "new"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        store
            .put(
                "leads",
                "l1",
                json!({"status": "follow_up"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        let doc = store.get("leads", "l1").await.unwrap().unwrap();
        assert!(doc.field("handle").is_none());
        assert_eq!(doc.field("status"), Some(&json!("follow_up")));
    }

    #[tokio::test]
    async fn test_non_object_fields_rejected() {
        let store = MemoryStore::new();
        let result = store
            .put(
                "leads",
                "l1",
                json!([1, 2, 3]),
                WriteMode::Replace,
                Precondition::None,
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_must_exist_rejects_absent() {
        let store = MemoryStore::new();
        let result = store
            .put(
                "leads",
                "ghost",
                json!({"status": "follow_up"}),
                WriteMode::Merge,
                Precondition::MustExist,
            )
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_must_not_exist_rejects_present() {
        let store = MemoryStore::new();
        store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": true}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        let result = store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": true}),
                WriteMode::Replace,
                Precondition::MustNotExist,
            )
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_field_equals_guards_stale_writes() {
        let store = MemoryStore::new();
        store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": true}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        // Matching expectation applies
        store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": false}),
                WriteMode::Merge,
                Precondition::FieldEquals("active".to_string(), json!(true)),
            )
            .await
            .unwrap();

        // Stale expectation conflicts
        let stale = store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": true}),
                WriteMode::Merge,
                Precondition::FieldEquals("active".to_string(), json!(true)),
            )
            .await;
        assert!(matches!(stale, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_field_equals_on_absent_doc_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .put(
                "leads",
                "ghost",
                json!({"status": "follow_up"}),
                WriteMode::Merge,
                Precondition::FieldEquals("status".to_string(), json!("new")),
            )
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_absent_field_compares_as_null() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        store
            .put(
                "leads",
                "l1",
                json!({"last_seen_at": 1_756_000_000_000i64}),
                WriteMode::Merge,
                Precondition::FieldEquals("last_seen_at".to_string(), JsonValue::Null),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_assigns_time_ordered_id_and_injects_it() {
        let store = MemoryStore::new();
        let first = store.create("leads", json!({"handle": "a"})).await.unwrap();
        let second = store.create("leads", json!({"handle": "b"})).await.unwrap();

        assert_eq!(first.field("id"), Some(&json!(first.id.clone())));
        assert!(Uuid::parse_str(&first.id).is_ok());
        assert!(first.id < second.id);
    }

    #[tokio::test]
    async fn test_delete_removes_and_counts() {
        let store = MemoryStore::new();
        store.create("leads", json!({"handle": "a"})).await.unwrap();
        let doc = store.create("leads", json!({"handle": "b"})).await.unwrap();

        store.delete("leads", &doc.id).await.unwrap();
        assert!(store.get("leads", &doc.id).await.unwrap().is_none());
        assert_eq!(store.write_count().await, 3);

        // Deleting an absent document is a no-op
        store.delete("leads", &doc.id).await.unwrap();
        assert_eq!(store.write_count().await, 3);
    }

    #[tokio::test]
    async fn test_subscription_initial_snapshot() {
        let store = MemoryStore::new();
        store.create("leads", json!({"handle": "a"})).await.unwrap();

        let sub = store.subscribe(Query::all("leads")).await.unwrap();
        assert_eq!(sub.initial.docs.len(), 1);
        assert_eq!(sub.initial.revision, 1);
    }

    #[tokio::test]
    async fn test_subscription_pushes_on_write() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Query::all("leads")).await.unwrap();
        assert!(sub.initial.docs.is_empty());

        store.create("leads", json!({"handle": "a"})).await.unwrap();

        let snapshot = sub.updates.recv().await.unwrap();
        assert_eq!(snapshot.docs.len(), 1);
        assert_eq!(snapshot.revision, 2);
    }

    #[tokio::test]
    async fn test_writer_receives_its_own_push() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Query::all("leads")).await.unwrap();

        // Same task writes and then observes the fan-out
        store.create("leads", json!({"handle": "self"})).await.unwrap();
        let snapshot = sub.updates.recv().await.unwrap();
        assert_eq!(snapshot.docs.len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_subscription_sees_entry_and_exit() {
        let store = MemoryStore::new();
        let query = Query::all("leads")
            .with_filter(FieldFilter::new("status", json!("appointment_set")));
        let mut sub = store.subscribe(query).await.unwrap();

        let doc = store
            .create("leads", json!({"handle": "a", "status": "new"}))
            .await
            .unwrap();
        // status=new does not match; no push for this write

        store
            .put(
                "leads",
                &doc.id,
                json!({"status": "appointment_set"}),
                WriteMode::Merge,
                Precondition::None,
            )
            .await
            .unwrap();
        let entered = sub.updates.recv().await.unwrap();
        assert_eq!(entered.docs.len(), 1);

        store
            .put(
                "leads",
                &doc.id,
                json!({"status": "session_done"}),
                WriteMode::Merge,
                Precondition::None,
            )
            .await
            .unwrap();
        let left = sub.updates.recv().await.unwrap();
        assert!(left.docs.is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_collection_does_not_push() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Query::all("leads")).await.unwrap();

        store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": false}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        assert!(matches!(
            sub.updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_sort_desc_with_id_tiebreak() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "b",
                json!({"first_contact_at": 100}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();
        store
            .put(
                "leads",
                "a",
                json!({"first_contact_at": 100}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();
        store
            .put(
                "leads",
                "c",
                json!({"first_contact_at": 300}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        let sub = store
            .subscribe(Query::all("leads").with_sort(SortSpec::desc("first_contact_at")))
            .await
            .unwrap();

        let ids: Vec<&str> = sub.initial.docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_sort_asc() {
        let store = MemoryStore::new();
        store
            .put(
                "leads",
                "x",
                json!({"first_contact_at": 200}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();
        store
            .put(
                "leads",
                "y",
                json!({"first_contact_at": 100}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        let sub = store
            .subscribe(Query::all("leads").with_sort(SortSpec::asc("first_contact_at")))
            .await
            .unwrap();

        let ids: Vec<&str> = sub.initial.docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x"]);
    }

    #[tokio::test]
    async fn test_revisions_increase_per_query() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Query::all("leads")).await.unwrap();
        assert_eq!(sub.initial.revision, 1);

        store.create("leads", json!({"handle": "a"})).await.unwrap();
        store.create("leads", json!({"handle": "b"})).await.unwrap();

        assert_eq!(sub.updates.recv().await.unwrap().revision, 2);
        assert_eq!(sub.updates.recv().await.unwrap().revision, 3);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe(Query::all("leads")).await.unwrap();
        assert_eq!(store.live_query_count().await, 1);

        drop(sub);
        assert_eq!(store.live_query_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_receivers() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Query::all("leads")).await.unwrap();

        store.disconnect_all().await;

        assert!(matches!(
            sub.updates.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(store.live_query_count().await, 0);
    }

    #[tokio::test]
    async fn test_lagged_receiver_catches_newest() {
        let store = MemoryStore::with_channel_capacity(1);
        let mut sub = store.subscribe(Query::all("leads")).await.unwrap();

        for i in 0..5 {
            store
                .create("leads", json!({"handle": format!("h{}", i)}))
                .await
                .unwrap();
        }

        // Buffer overflowed; the receiver reports the lag then resumes at
        // the newest buffered snapshot, which is complete on its own.
        let result = sub.updates.recv().await;
        assert!(matches!(
            result,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        let newest = sub.updates.recv().await.unwrap();
        assert_eq!(newest.docs.len(), 5);
    }

    #[tokio::test]
    async fn test_doc_watch_lifecycle() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe_doc("system_settings", "main_controls")
            .await
            .unwrap();
        assert!(sub.initial.doc.is_none());

        store
            .put(
                "system_settings",
                "main_controls",
                json!({"active": true}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();
        let created = sub.updates.recv().await.unwrap();
        assert_eq!(
            created.doc.unwrap().field("active"),
            Some(&json!(true))
        );

        store.delete("system_settings", "main_controls").await.unwrap();
        let deleted = sub.updates.recv().await.unwrap();
        assert!(deleted.doc.is_none());
    }

    #[tokio::test]
    async fn test_doc_watchers_share_a_channel() {
        let store = MemoryStore::new();
        let mut first = store.subscribe_doc("leads", "l1").await.unwrap();
        let mut second = store.subscribe_doc("leads", "l1").await.unwrap();
        assert_eq!(store.doc_watch_count().await, 1);

        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();

        assert!(first.updates.recv().await.unwrap().doc.is_some());
        assert!(second.updates.recv().await.unwrap().doc.is_some());
    }

    #[tokio::test]
    async fn test_late_doc_watcher_starts_at_the_watch_revision() {
        let store = MemoryStore::new();
        let mut first = store.subscribe_doc("leads", "l1").await.unwrap();
        assert_eq!(first.initial.revision, 1);

        store
            .put(
                "leads",
                "l1",
                json!({"handle": "ayse"}),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .unwrap();
        assert_eq!(first.updates.recv().await.unwrap().revision, 2);

        // Joining the shared channel now, the initial snapshot continues the
        // feed's numbering instead of restarting at 1
        let mut second = store.subscribe_doc("leads", "l1").await.unwrap();
        assert_eq!(second.initial.revision, 2);

        store
            .put(
                "leads",
                "l1",
                json!({"status": "follow_up"}),
                WriteMode::Merge,
                Precondition::None,
            )
            .await
            .unwrap();
        assert_eq!(first.updates.recv().await.unwrap().revision, 3);
        assert_eq!(second.updates.recv().await.unwrap().revision, 3);
    }

    #[test]
    fn test_compare_json_orders_types_and_values() {
        assert_eq!(compare_json(&json!(1), &json!(2)), CmpOrdering::Less);
        assert_eq!(compare_json(&json!(2.5), &json!(2)), CmpOrdering::Greater);
        assert_eq!(compare_json(&json!("a"), &json!("b")), CmpOrdering::Less);
        assert_eq!(compare_json(&json!(null), &json!(false)), CmpOrdering::Less);
        assert_eq!(compare_json(&json!(true), &json!(0)), CmpOrdering::Less);
        assert_eq!(compare_json(&json!("x"), &json!("x")), CmpOrdering::Equal);
    }
}
