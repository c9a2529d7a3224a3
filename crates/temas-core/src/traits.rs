//! Store contract for the temas engine.
//!
//! The remote document store is the single source of truth. This module
//! defines the adapter trait every backend must satisfy plus the document,
//! query, and snapshot types that cross it. Repositories and services hold
//! an injected `Arc<dyn DocumentStore>` and never a global handle.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use crate::error::{Error, Result};

// =============================================================================
// DOCUMENT
// =============================================================================

/// A stored document: opaque id plus JSON field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: JsonValue,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: JsonValue) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Deserialize the field map into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.fields.clone()).map_err(Error::from)
    }

    /// Serialize a typed value into a document under the given id.
    pub fn encode<T: Serialize>(id: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            fields: serde_json::to_value(value)?,
        })
    }

    /// Borrow a single field by name, if present.
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// Sort direction for a query result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    /// Newest first, the console's default presentation
    #[default]
    Desc,
}

/// Sort key for a query result set. Ties break on document id so the
/// displayed order is stable across pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Equality match on a single document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: JsonValue,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Shape of a live query: collection, optional filter, optional sort.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<FieldFilter>,
    pub sort: Option<SortSpec>,
}

impl Query {
    /// Every document in the collection, unsorted.
    pub fn all(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            sort: None,
        }
    }

    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

// =============================================================================
// WRITES
// =============================================================================

/// How `put` combines the given fields with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Field-wise upsert; fields not named keep their current values
    Merge,
    /// The given fields become the entire document
    Replace,
}

/// Condition checked atomically with a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    None,
    /// Reject with `NotFound` if the document is absent
    MustExist,
    /// Reject with `Conflict` if the document already exists
    MustNotExist,
    /// Reject with `Conflict` unless the named field currently equals the
    /// value; absent document rejects with `NotFound`
    FieldEquals(String, JsonValue),
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Complete ordered result set of a query at one store revision.
///
/// Every push carries the full set, so consumers that miss intermediate
/// pushes lose nothing by acting on the newest one only.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
    /// Monotone per-query counter; later pushes carry larger values
    pub revision: u64,
}

impl QuerySnapshot {
    /// Decode every document into a typed value, preserving order.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.docs.iter().map(Document::decode).collect()
    }
}

/// State of a single watched document at one store revision.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSnapshot {
    pub doc: Option<Document>,
    pub revision: u64,
}

/// Live query feed: the result set as of subscription time plus a channel
/// of subsequent snapshots. Dropping the receiver is the unsubscribe.
#[derive(Debug)]
pub struct QuerySubscription {
    pub initial: QuerySnapshot,
    pub updates: broadcast::Receiver<QuerySnapshot>,
}

/// Single-document feed, same lifecycle as [`QuerySubscription`].
#[derive(Debug)]
pub struct DocSubscription {
    pub initial: DocSnapshot,
    pub updates: broadcast::Receiver<DocSnapshot>,
}

// =============================================================================
// STORE ADAPTER
// =============================================================================

/// Durable document store with live query subscriptions.
///
/// Writes are atomic per document, preconditions included. Every applied
/// write fans out one fresh snapshot to each live subscription whose query
/// matches the affected document, the writer's own subscriptions included.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Write a document under a caller-chosen id.
    ///
    /// Returns the document as stored after the write. The precondition is
    /// checked atomically with the apply.
    async fn put(
        &self,
        collection: &str,
        id: &str,
        fields: JsonValue,
        mode: WriteMode,
        precondition: Precondition,
    ) -> Result<Document>;

    /// Insert a document under a store-assigned id.
    ///
    /// The assigned id is written into the field map under `"id"` so decoded
    /// values are self-describing.
    async fn create(&self, collection: &str, fields: JsonValue) -> Result<Document>;

    /// Delete a document. Deleting an absent document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Evaluate a query once, without subscribing.
    async fn query(&self, query: Query) -> Result<Vec<Document>>;

    /// Open a live query subscription.
    async fn subscribe(&self, query: Query) -> Result<QuerySubscription>;

    /// Open a live single-document subscription.
    async fn subscribe_doc(&self, collection: &str, id: &str) -> Result<DocSubscription>;
}
