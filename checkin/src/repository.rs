//! Typed access to a document collection.
//!
//! [`Collection`] pairs a collection name with the Rust type stored in it and
//! handles the JSON conversion in both directions.

use campus_events_core::document_store::{DocumentError, DocumentStore, Query};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Serialize a value into a document body.
///
/// # Errors
///
/// Returns [`DocumentError::Serialization`] if the value cannot be represented as JSON.
pub fn to_document<T: Serialize>(value: &T) -> Result<Value, DocumentError> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize a document body.
///
/// # Errors
///
/// Returns [`DocumentError::Serialization`] if the body doesn't match `T`.
pub fn from_document<T: DeserializeOwned>(value: Value) -> Result<T, DocumentError> {
    Ok(serde_json::from_value(value)?)
}

/// A collection whose documents deserialize to `T`.
pub struct Collection<T> {
    documents: Arc<dyn DocumentStore>,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind a collection name to its document type.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self {
            documents,
            name,
            _marker: PhantomData,
        }
    }

    /// Collection name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Start a query over this collection.
    #[must_use]
    pub fn query(&self) -> Query {
        Query::collection(self.name)
    }

    /// Fetch and decode one document.
    ///
    /// # Errors
    ///
    /// Storage or deserialization failures.
    pub async fn get(&self, id: &str) -> Result<Option<T>, DocumentError> {
        self.documents
            .get(self.name, id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Run a query and decode every result.
    ///
    /// # Errors
    ///
    /// Storage or deserialization failures.
    pub async fn fetch(&self, query: Query) -> Result<Vec<T>, DocumentError> {
        self.documents
            .query(query)
            .await?
            .into_iter()
            .map(|snapshot| from_document(snapshot.data))
            .collect()
    }

    /// Replace or create a document.
    ///
    /// # Errors
    ///
    /// Storage or serialization failures.
    pub async fn put(&self, id: &str, value: &T) -> Result<(), DocumentError> {
        self.documents.set(self.name, id, to_document(value)?).await
    }

    /// Delete every document in the collection.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn clear(&self) -> Result<u64, DocumentError> {
        self.documents.clear_collection(self.name).await
    }

    /// Subscribe to a query, decoding each snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Subscription`] if the change feed can't be opened.
    pub async fn watch(
        &self,
        query: Query,
    ) -> Result<impl Stream<Item = Result<Vec<T>, DocumentError>> + Send + use<T>, DocumentError> {
        let snapshots = self.documents.subscribe(query).await?;
        Ok(snapshots.map(|snapshot| {
            snapshot?
                .into_iter()
                .map(|doc| from_document(doc.data))
                .collect()
        }))
    }
}
