//! Document store trait and related types.
//!
//! This module defines the storage abstraction the campus services run
//! against: string-keyed JSON documents grouped into named collections, in
//! the style of a managed document database.
//!
//! # Capabilities
//!
//! - Keyed reads (`get`)
//! - Equality-filtered, ordered, limited queries (`query`)
//! - Atomic write batches with per-document preconditions (`commit`)
//! - Live query subscriptions that re-deliver the full result set on every
//!   change (`subscribe`)
//! - Bulk collection clears for dev/test resets (`clear_collection`)
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `campus-events-postgres`): JSONB table with
//!   `LISTEN/NOTIFY` change feeds
//! - `InMemoryDocumentStore` (in `campus-events-testing`): fast, deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use campus_events_core::document_store::{DocumentStore, DocumentError, Precondition, WriteBatch};
//! use serde_json::json;
//!
//! async fn check_in<S: DocumentStore>(store: &S) -> Result<(), DocumentError> {
//!     let batch = WriteBatch::new()
//!         .create("attendance", "event1_user3", json!({ "eventId": "event1" }))
//!         .merge(
//!             "rsvps",
//!             "event1_user3",
//!             json!({ "checkedIn": true }),
//!             Some(Precondition::field_equals("checkedIn", false)),
//!         );
//!     store.commit(batch).await
//! }
//! ```

use futures::Stream;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// A merge targeted a document that does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        /// Collection that was addressed.
        collection: String,
        /// Document id that was addressed.
        id: String,
    },

    /// A write precondition did not hold; nothing in the batch was applied.
    #[error("Precondition failed for {collection}/{id}: {reason}")]
    PreconditionFailed {
        /// Collection of the failing write.
        collection: String,
        /// Document id of the failing write.
        id: String,
        /// Human-readable description of the precondition.
        reason: String,
    },

    /// Document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Live subscription could not be established or was interrupted.
    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl From<serde_json::Error> for DocumentError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// A document together with its id, as returned by queries.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    /// Document id within its collection.
    pub id: String,
    /// Document body (always a JSON object).
    pub data: Value,
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// A filtered, ordered view over one collection.
///
/// Mirrors the query surface of a managed document database: equality
/// filters on top-level fields, an optional single ordering field and a
/// result limit. Documents missing the ordering field are excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection to read from.
    pub collection: String,
    /// `(field, value)` pairs that must all match.
    pub filters: Vec<(String, Value)>,
    /// Optional ordering field and direction.
    pub order_by: Option<(String, Direction)>,
    /// Optional maximum number of results.
    pub limit: Option<usize>,
}

impl Query {
    /// Query every document in `collection`.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Require `field == value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Order results by `field`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Return at most `limit` results.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document body satisfies every filter (and has the ordering field).
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        let filters_hold = self
            .filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected));

        let has_order_field = self
            .order_by
            .as_ref()
            .is_none_or(|(field, _)| data.get(field).is_some_and(|v| !v.is_null()));

        filters_hold && has_order_field
    }

    /// Evaluate the query against an unordered set of documents.
    ///
    /// Backends without native query support (the in-memory store) use this
    /// directly. Ties on the ordering field are broken by document id so
    /// results are deterministic.
    #[must_use]
    pub fn apply<I>(&self, documents: I) -> Vec<DocumentSnapshot>
    where
        I: IntoIterator<Item = DocumentSnapshot>,
    {
        let mut results: Vec<DocumentSnapshot> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.data))
            .collect();

        match &self.order_by {
            Some((field, direction)) => results.sort_by(|a, b| {
                let ordering = compare_values(
                    a.data.get(field).unwrap_or(&Value::Null),
                    b.data.get(field).unwrap_or(&Value::Null),
                );
                let ordering = match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                ordering.then_with(|| a.id.cmp(&b.id))
            }),
            None => results.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

/// Total order over JSON values used for query ordering.
///
/// Values of different types order as null < bool < number < string <
/// array < object; values of the same scalar type compare naturally.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    const fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&y.as_f64().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Condition a document must satisfy for a write to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The document must already exist.
    Exists,
    /// The document must not exist yet.
    Missing,
    /// The document must exist and `field` must equal `value`.
    FieldEquals {
        /// Top-level field name.
        field: String,
        /// Required current value.
        value: Value,
    },
}

impl Precondition {
    /// Convenience constructor for [`Precondition::FieldEquals`].
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check the precondition against the current document body.
    ///
    /// A missing field compares equal to `null`, so `FieldEquals { value: false }`
    /// does not hold for a document without the field.
    #[must_use]
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match (self, current) {
            (Self::Exists, current) => current.is_some(),
            (Self::Missing, current) => current.is_none(),
            (Self::FieldEquals { .. }, None) => false,
            (Self::FieldEquals { field, value }, Some(doc)) => {
                doc.get(field).unwrap_or(&Value::Null) == value
            },
        }
    }

    /// Describe the precondition for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Exists => "document must exist".to_string(),
            Self::Missing => "document already exists".to_string(),
            Self::FieldEquals { field, value } => format!("expected {field} == {value}"),
        }
    }
}

/// The mutation a single [`Write`] performs.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Replace (or create) the whole document.
    Set(Value),
    /// Shallow-merge top-level fields into an existing document.
    Merge(Value),
    /// Remove the document if present.
    Delete,
}

/// One document mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    /// Target collection.
    pub collection: String,
    /// Target document id.
    pub id: String,
    /// What to do with the document.
    pub kind: WriteKind,
    /// Optional condition checked before anything in the batch is applied.
    pub precondition: Option<Precondition>,
}

/// An all-or-nothing group of writes.
///
/// Every precondition is checked against the state before the batch; if any
/// fails, nothing is written and [`DocumentError::PreconditionFailed`] is
/// returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { writes: Vec::new() }
    }

    /// Append a raw write.
    #[must_use]
    pub fn push(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// Replace or create a document unconditionally.
    #[must_use]
    pub fn set(self, collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        self.push(Write {
            collection: collection.into(),
            id: id.into(),
            kind: WriteKind::Set(data),
            precondition: None,
        })
    }

    /// Create a document, failing the batch if it already exists.
    #[must_use]
    pub fn create(self, collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        self.push(Write {
            collection: collection.into(),
            id: id.into(),
            kind: WriteKind::Set(data),
            precondition: Some(Precondition::Missing),
        })
    }

    /// Merge fields into an existing document.
    #[must_use]
    pub fn merge(
        self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Value,
        precondition: Option<Precondition>,
    ) -> Self {
        self.push(Write {
            collection: collection.into(),
            id: id.into(),
            kind: WriteKind::Merge(fields),
            precondition,
        })
    }

    /// Delete a document.
    #[must_use]
    pub fn delete(self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        self.push(Write {
            collection: collection.into(),
            id: id.into(),
            kind: WriteKind::Delete,
            precondition: None,
        })
    }

    /// Writes in submission order.
    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Consume the batch.
    #[must_use]
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    /// Number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the batch contains no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Shallow-merge the top-level fields of `fields` into `existing`.
///
/// Non-object inputs are treated as empty objects.
#[must_use]
pub fn merge_fields(existing: &Value, fields: &Value) -> Value {
    let mut merged: Map<String, Value> = existing.as_object().cloned().unwrap_or_default();
    if let Some(update) = fields.as_object() {
        for (key, value) in update {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Stream of full query result sets.
///
/// Each item replaces the previous one; consumers must not treat items as diffs.
/// Dropping the stream tears down the subscription.
pub type SnapshotStream =
    Pin<Box<dyn Stream<Item = Result<Vec<DocumentSnapshot>, DocumentError>> + Send>>;

/// Boxed future returned by [`DocumentStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DocumentError>> + Send + 'a>>;

/// Document store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; services share them as
/// `Arc<dyn DocumentStore>` and capture them inside effects.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures rather than using `async fn` so the trait
/// can be used as a trait object.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document body, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    fn get(&self, collection: &str, id: &str) -> StoreFuture<'_, Option<Value>>;

    /// Run a one-shot query.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    fn query(&self, query: Query) -> StoreFuture<'_, Vec<DocumentSnapshot>>;

    /// Apply a batch atomically.
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed`: a precondition did not hold; nothing applied
    /// - `NotFound`: a merge targeted a missing document; nothing applied
    /// - `Database`: backend failure
    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, ()>;

    /// Subscribe to a query.
    ///
    /// The stream yields the current result set immediately, then a fresh
    /// full result set after every change to the queried collection.
    ///
    /// # Errors
    ///
    /// - `Subscription`: the change feed could not be established
    fn subscribe(&self, query: Query) -> StoreFuture<'_, SnapshotStream>;

    /// Delete every document in a collection, returning how many were removed.
    ///
    /// # Errors
    ///
    /// - `Database`: backend failure
    fn clear_collection(&self, collection: &str) -> StoreFuture<'_, u64>;

    /// Replace or create one document.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::commit`].
    fn set(&self, collection: &str, id: &str, data: Value) -> StoreFuture<'_, ()> {
        self.commit(WriteBatch::new().set(collection, id, data))
    }

    /// Delete one document.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::commit`].
    fn delete(&self, collection: &str, id: &str) -> StoreFuture<'_, ()> {
        self.commit(WriteBatch::new().delete(collection, id))
    }
}
