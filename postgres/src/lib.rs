//! `PostgreSQL` document store for the campus events services.
//!
//! Implements the `DocumentStore` trait from `campus-events-core` on a single
//! `documents` table keyed by `(collection, id)` with a `JSONB` body:
//!
//! - Batches run in one transaction; rows named by a precondition are locked
//!   with `SELECT ... FOR UPDATE` before being checked
//! - Every committed batch notifies the `document_changes` channel with the
//!   name of each touched collection
//! - Subscriptions `LISTEN` on that channel and re-run their query
//!
//! # Example
//!
//! ```ignore
//! use campus_events_postgres::PostgresDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let documents = PostgresDocumentStore::connect("postgres://localhost/campus", 10, 1).await?;
//!     documents.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use campus_events_core::document_store::{
    Direction, DocumentError, DocumentSnapshot, DocumentStore, Precondition, Query,
    SnapshotStream, StoreFuture, Write, WriteBatch, WriteKind,
};
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::BTreeSet;

/// Notification channel carrying the names of changed collections.
pub const CHANGE_CHANNEL: &str = "document_changes";

fn database(context: &'static str) -> impl Fn(sqlx::Error) -> DocumentError {
    move |e| DocumentError::Database(format!("{context}: {e}"))
}

/// `PostgreSQL`-backed document store.
#[derive(Clone, Debug)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Create a store from an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Database`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, DocumentError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(database_url)
            .await
            .map_err(database("Failed to connect"))?;

        tracing::info!(max_connections, min_connections, "Connected to document database");
        Ok(Self::from_pool(pool))
    }

    /// Create the `documents` table if it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), DocumentError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DocumentError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Run a query with filters, ordering and limit pushed down to SQL.
///
/// Ordering uses `JSONB` comparison, which agrees with the in-memory order for
/// values of the same type (numbers, strings, booleans).
async fn fetch_query(pool: &PgPool, query: &Query) -> Result<Vec<DocumentSnapshot>, DocumentError> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT id, data FROM documents WHERE collection = ");
    builder.push_bind(query.collection.clone());

    for (field, value) in &query.filters {
        builder
            .push(" AND data -> ")
            .push_bind(field.clone())
            .push(" = ")
            .push_bind(value.clone());
    }

    match &query.order_by {
        Some((field, direction)) => {
            builder
                .push(" AND jsonb_typeof(data -> ")
                .push_bind(field.clone())
                .push(") IS DISTINCT FROM 'null' AND data ? ")
                .push_bind(field.clone());
            let direction = match direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            builder
                .push(" ORDER BY data -> ")
                .push_bind(field.clone())
                .push(format!(" {direction}, id ASC"));
        },
        None => {
            builder.push(" ORDER BY id ASC");
        },
    }

    if let Some(limit) = query.limit {
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .map_err(database("Failed to run query"))?;

    rows.iter()
        .map(|row| {
            Ok(DocumentSnapshot {
                id: row.try_get("id").map_err(database("Failed to read id"))?,
                data: row.try_get("data").map_err(database("Failed to read data"))?,
            })
        })
        .collect()
}

/// Apply one write inside the batch transaction.
async fn apply_write(
    tx: &mut Transaction<'_, Postgres>,
    write: Write,
) -> Result<(), DocumentError> {
    let current: Option<Value> = sqlx::query_scalar(
        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
    )
    .bind(&write.collection)
    .bind(&write.id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(database("Failed to lock document"))?;

    let precondition_failed = |precondition: &Precondition| DocumentError::PreconditionFailed {
        collection: write.collection.clone(),
        id: write.id.clone(),
        reason: precondition.describe(),
    };

    if let Some(precondition) = &write.precondition
        && !precondition.holds(current.as_ref())
    {
        return Err(precondition_failed(precondition));
    }

    let create_only = write.precondition == Some(Precondition::Missing);
    match write.kind {
        WriteKind::Set(data) if create_only => {
            // A missing row can't be locked; the insert itself arbitrates
            // concurrent creators.
            let inserted = sqlx::query(
                r"
                INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO NOTHING
                ",
            )
            .bind(&write.collection)
            .bind(&write.id)
            .bind(data)
            .execute(&mut **tx)
            .await
            .map_err(database("Failed to create document"))?;

            if inserted.rows_affected() != 1 {
                return Err(precondition_failed(&Precondition::Missing));
            }
        },
        WriteKind::Set(data) => {
            sqlx::query(
                r"
                INSERT INTO documents (collection, id, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id)
                DO UPDATE SET data = EXCLUDED.data, updated_at = now()
                ",
            )
            .bind(&write.collection)
            .bind(&write.id)
            .bind(data)
            .execute(&mut **tx)
            .await
            .map_err(database("Failed to set document"))?;
        },
        WriteKind::Merge(fields) => {
            if current.is_none() {
                return Err(DocumentError::NotFound {
                    collection: write.collection,
                    id: write.id,
                });
            }
            sqlx::query(
                r"
                UPDATE documents
                SET data = data || $3, updated_at = now()
                WHERE collection = $1 AND id = $2
                ",
            )
            .bind(&write.collection)
            .bind(&write.id)
            .bind(fields)
            .execute(&mut **tx)
            .await
            .map_err(database("Failed to merge document"))?;
        },
        WriteKind::Delete => {
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(&write.collection)
                .bind(&write.id)
                .execute(&mut **tx)
                .await
                .map_err(database("Failed to delete document"))?;
        },
    }
    Ok(())
}

async fn notify(
    tx: &mut Transaction<'_, Postgres>,
    collections: &BTreeSet<String>,
) -> Result<(), DocumentError> {
    for collection in collections {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(collection)
            .execute(&mut **tx)
            .await
            .map_err(database("Failed to notify"))?;
    }
    Ok(())
}

impl DocumentStore for PostgresDocumentStore {
    fn get(&self, collection: &str, id: &str) -> StoreFuture<'_, Option<Value>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(database("Failed to get document"))
        })
    }

    fn query(&self, query: Query) -> StoreFuture<'_, Vec<DocumentSnapshot>> {
        Box::pin(async move { fetch_query(&self.pool, &query).await })
    }

    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let writes = batch.len();
            let touched: BTreeSet<String> =
                batch.writes().iter().map(|w| w.collection.clone()).collect();

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(database("Failed to start transaction"))?;

            for write in batch.into_writes() {
                if let Err(error) = apply_write(&mut tx, write).await {
                    let _ = tx.rollback().await; // Ignore rollback errors
                    metrics::counter!("document_store.commits.rejected").increment(1);
                    return Err(error);
                }
            }

            notify(&mut tx, &touched).await?;
            tx.commit()
                .await
                .map_err(database("Failed to commit transaction"))?;

            tracing::debug!(writes, collections = ?touched, "Committed document batch");
            metrics::counter!("document_store.commits").increment(1);
            Ok(())
        })
    }

    fn subscribe(&self, query: Query) -> StoreFuture<'_, SnapshotStream> {
        Box::pin(async move {
            let subscription = |e: sqlx::Error| DocumentError::Subscription(e.to_string());
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(subscription)?;
            listener.listen(CHANGE_CHANNEL).await.map_err(subscription)?;

            let initial = fetch_query(&self.pool, &query).await?;
            let pool = self.pool.clone();

            let stream = async_stream::stream! {
                yield Ok(initial);
                loop {
                    match listener.recv().await {
                        Ok(notification) if notification.payload() == query.collection => {
                            yield fetch_query(&pool, &query).await;
                        },
                        Ok(_) => {},
                        Err(e) => {
                            tracing::warn!(error = %e, collection = %query.collection, "Document listener failed");
                            yield Err(DocumentError::Subscription(e.to_string()));
                            break;
                        },
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }

    fn clear_collection(&self, collection: &str) -> StoreFuture<'_, u64> {
        let collection = collection.to_string();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(database("Failed to start transaction"))?;

            let removed = sqlx::query("DELETE FROM documents WHERE collection = $1")
                .bind(&collection)
                .execute(&mut *tx)
                .await
                .map_err(database("Failed to clear collection"))?
                .rows_affected();

            notify(&mut tx, &BTreeSet::from([collection.clone()])).await?;
            tx.commit()
                .await
                .map_err(database("Failed to commit transaction"))?;

            tracing::info!(collection = %collection, removed, "Cleared collection");
            Ok(removed)
        })
    }
}
