//! In-memory document store
//!
//! [`InMemoryDocumentStore`] implements `DocumentStore` over a
//! `HashMap<collection, BTreeMap<id, document>>`. It honours the same
//! contract as the Postgres backend:
//!
//! - batches are atomic; every precondition is checked before any write lands
//! - subscriptions yield the current result set, then a full fresh result
//!   set after every change to the queried collection
//!
//! Failure injection ([`InMemoryDocumentStore::fail_next`],
//! [`InMemoryDocumentStore::set_unavailable`]) lets tests exercise the
//! transport-error paths.

use campus_events_core::document_store::{
    DocumentError, DocumentSnapshot, DocumentStore, Query, SnapshotStream, StoreFuture,
    WriteBatch, WriteKind, merge_fields,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// Capacity of the change-notification channel.
const CHANGE_CAPACITY: usize = 256;

/// In-memory document store for fast, deterministic tests and local demos.
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use campus_events_testing::InMemoryDocumentStore;
/// use campus_events_core::document_store::DocumentStore;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// store.set("events", "event1", json!({ "title": "Career Fair" })).await?;
///
/// let event = store.get("events", "event1").await?;
/// assert_eq!(event, Some(json!({ "title": "Career Fair" })));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<String>,
    next_failure: Arc<Mutex<Option<String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
            next_failure: Arc::new(Mutex::new(None)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed a document directly, bypassing batches and preconditions.
    pub fn insert(&self, collection: &str, id: &str, data: Value) {
        if let Ok(mut collections) = self.collections.write() {
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), data);
        }
        let _ = self.changes.send(collection.to_string());
    }

    /// Read a document synchronously (for assertions).
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .read()
            .ok()
            .and_then(|collections| collections.get(collection)?.get(id).cloned())
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map_or(0, |collections| collections.get(collection).map_or(0, BTreeMap::len))
    }

    /// Whether every collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections
            .read()
            .map_or(true, |collections| collections.values().all(BTreeMap::is_empty))
    }

    /// Make the next operation fail with [`DocumentError::Database`].
    pub fn fail_next(&self, message: impl Into<String>) {
        if let Ok(mut next) = self.next_failure.lock() {
            *next = Some(message.into());
        }
    }

    /// Make every operation fail until reset, as if the backend were offline.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DocumentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DocumentError::Database("document store unavailable".to_string()));
        }
        let injected = self.next_failure.lock().ok().and_then(|mut next| next.take());
        match injected {
            Some(message) => Err(DocumentError::Database(message)),
            None => Ok(()),
        }
    }

    fn read_collections(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, Collections>, DocumentError> {
        self.collections
            .read()
            .map_err(|_| DocumentError::Database("document lock poisoned".to_string()))
    }

    fn run_query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>, DocumentError> {
        let collections = self.read_collections()?;
        let documents = collections
            .get(&query.collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .map(|(id, data)| DocumentSnapshot {
                id: id.clone(),
                data: data.clone(),
            });
        Ok(query.apply(documents))
    }

    fn apply_batch(&self, batch: WriteBatch) -> Result<BTreeSet<String>, DocumentError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DocumentError::Database("document lock poisoned".to_string()))?;

        // Stage every write against a view of (base + earlier staged writes).
        let mut staged: HashMap<(String, String), Option<Value>> = HashMap::new();
        for write in batch.into_writes() {
            let key = (write.collection.clone(), write.id.clone());
            let current = match staged.get(&key) {
                Some(staged) => staged.clone(),
                None => collections
                    .get(&write.collection)
                    .and_then(|docs| docs.get(&write.id))
                    .cloned(),
            };

            if let Some(precondition) = &write.precondition
                && !precondition.holds(current.as_ref())
            {
                return Err(DocumentError::PreconditionFailed {
                    collection: write.collection,
                    id: write.id,
                    reason: precondition.describe(),
                });
            }

            let next = match write.kind {
                WriteKind::Set(data) => Some(data),
                WriteKind::Merge(fields) => match current {
                    Some(existing) => Some(merge_fields(&existing, &fields)),
                    None => {
                        return Err(DocumentError::NotFound {
                            collection: write.collection,
                            id: write.id,
                        });
                    },
                },
                WriteKind::Delete => None,
            };
            staged.insert(key, next);
        }

        let mut touched = BTreeSet::new();
        for ((collection, id), value) in staged {
            let docs = collections.entry(collection.clone()).or_default();
            match value {
                Some(data) => {
                    docs.insert(id, data);
                },
                None => {
                    docs.remove(&id);
                },
            }
            touched.insert(collection);
        }
        Ok(touched)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, collection: &str, id: &str) -> StoreFuture<'_, Option<Value>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            self.check_available()?;
            let collections = self.read_collections()?;
            Ok(collections.get(&collection).and_then(|docs| docs.get(&id)).cloned())
        })
    }

    fn query(&self, query: Query) -> StoreFuture<'_, Vec<DocumentSnapshot>> {
        Box::pin(async move {
            self.check_available()?;
            self.run_query(&query)
        })
    }

    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            let touched = self.apply_batch(batch)?;
            for collection in touched {
                tracing::trace!(collection = %collection, "In-memory collection changed");
                let _ = self.changes.send(collection);
            }
            Ok(())
        })
    }

    fn subscribe(&self, query: Query) -> StoreFuture<'_, SnapshotStream> {
        Box::pin(async move {
            self.check_available()
                .map_err(|e| DocumentError::Subscription(e.to_string()))?;

            // Subscribe before the initial read so no change can slip between them.
            let mut changes = self.changes.subscribe();
            let initial = self.run_query(&query)?;
            let store = self.clone();

            let stream = async_stream::stream! {
                yield Ok(initial);
                loop {
                    match changes.recv().await {
                        Ok(collection) if collection == query.collection => {
                            yield store.run_query(&query);
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            yield store.run_query(&query);
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn clear_collection(&self, collection: &str) -> StoreFuture<'_, u64> {
        let collection = collection.to_string();
        Box::pin(async move {
            self.check_available()?;
            let removed = {
                let mut collections = self
                    .collections
                    .write()
                    .map_err(|_| DocumentError::Database("document lock poisoned".to_string()))?;
                collections
                    .remove(&collection)
                    .map_or(0, |docs| docs.len() as u64)
            };
            let _ = self.changes.send(collection);
            Ok(removed)
        })
    }
}
