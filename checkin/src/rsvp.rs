//! RSVP service.
//!
//! One RSVP per (event, user), stored under [`composite_id`]. The first
//! status set creates the record; later changes only touch `status`, so
//! `createdAt` and the check-in fields survive.

use crate::error::{CheckInError, Result};
use crate::repository::{Collection, to_document};
use crate::types::{EventId, Rsvp, RsvpCounts, RsvpStatus, UserId, collections, composite_id};
use campus_events_core::document_store::{DocumentError, DocumentStore, Precondition, WriteBatch};
use campus_events_core::environment::Clock;
use serde_json::json;
use std::sync::Arc;

/// Creates, updates and lists RSVPs.
#[derive(Clone)]
pub struct RsvpService {
    documents: Arc<dyn DocumentStore>,
    rsvps: Collection<Rsvp>,
    clock: Arc<dyn Clock>,
}

impl RsvpService {
    /// Create a service over `documents`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rsvps: Collection::new(Arc::clone(&documents), collections::RSVPS),
            documents,
            clock,
        }
    }

    /// Set a user's RSVP status for an event, creating the RSVP if needed.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::KeyConflict`]: the RSVP id is held by another pair
    /// - [`CheckInError::Storage`]: the store failed
    #[tracing::instrument(skip(self), fields(event_id = %event_id, user_id = %user_id))]
    pub async fn set_status(
        &self,
        event_id: &EventId,
        user_id: &UserId,
        status: RsvpStatus,
    ) -> Result<Rsvp> {
        let key = composite_id(event_id, user_id);

        if let Some(existing) = self.rsvps.get(&key).await? {
            if !existing.belongs_to(event_id, user_id) {
                return Err(CheckInError::KeyConflict(key));
            }
            self.update_status(&key, status).await?;
            tracing::debug!(status = %status, "RSVP updated");
            return self.rsvps.get(&key).await?.ok_or(CheckInError::RsvpNotFound);
        }

        let rsvp = Rsvp {
            event_id: event_id.clone(),
            user_id: user_id.clone(),
            status,
            checked_in: false,
            checked_in_at: None,
            created_at: self.clock.now(),
        };

        match self
            .documents
            .commit(WriteBatch::new().create(collections::RSVPS, &key, to_document(&rsvp)?))
            .await
        {
            Ok(()) => {
                tracing::debug!(status = %status, "RSVP created");
                metrics::counter!("rsvp.created").increment(1);
                Ok(rsvp)
            },
            // Created concurrently; fall back to an in-place update.
            Err(DocumentError::PreconditionFailed { .. }) => {
                self.update_status(&key, status).await?;
                self.rsvps
                    .get(&key)
                    .await?
                    .ok_or(CheckInError::RsvpNotFound)
            },
            Err(error) => Err(error.into()),
        }
    }

    async fn update_status(&self, key: &str, status: RsvpStatus) -> Result<()> {
        self.documents
            .commit(WriteBatch::new().merge(
                collections::RSVPS,
                key,
                json!({ "status": status }),
                Some(Precondition::Exists),
            ))
            .await?;
        Ok(())
    }

    /// RSVP for one (event, user), if any.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn get(&self, event_id: &EventId, user_id: &UserId) -> Result<Option<Rsvp>> {
        Ok(self
            .rsvps
            .get(&composite_id(event_id, user_id))
            .await?
            .filter(|rsvp| rsvp.belongs_to(event_id, user_id)))
    }

    /// Every RSVP for an event.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn for_event(&self, event_id: &EventId) -> Result<Vec<Rsvp>> {
        Ok(self
            .rsvps
            .fetch(self.rsvps.query().where_eq("eventId", event_id.as_str()))
            .await?)
    }

    /// Every RSVP a user has made.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn for_user(&self, user_id: &UserId) -> Result<Vec<Rsvp>> {
        Ok(self
            .rsvps
            .fetch(self.rsvps.query().where_eq("userId", user_id.as_str()))
            .await?)
    }

    /// Per-status totals for an event.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn counts(&self, event_id: &EventId) -> Result<RsvpCounts> {
        Ok(self
            .for_event(event_id)
            .await?
            .iter()
            .fold(RsvpCounts::default(), |mut counts, rsvp| {
                match rsvp.status {
                    RsvpStatus::Going => counts.going += 1,
                    RsvpStatus::Maybe => counts.maybe += 1,
                    RsvpStatus::NotGoing => counts.not_going += 1,
                }
                if rsvp.checked_in {
                    counts.checked_in += 1;
                }
                counts
            }))
    }

    /// Delete every RSVP.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.rsvps.clear().await?;
        tracing::warn!(removed, "Cleared all RSVPs");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campus_events_testing::{InMemoryDocumentStore, test_clock};
    use chrono::Duration;

    #[tokio::test]
    async fn status_change_preserves_creation_and_check_in() {
        let store = InMemoryDocumentStore::new();
        let clock = test_clock();
        let service = RsvpService::new(Arc::new(store.clone()), Arc::new(clock.clone()));
        let (event, user) = (EventId::new("event1"), UserId::new("user3"));

        let created = service.set_status(&event, &user, RsvpStatus::Going).await.unwrap();
        assert!(!created.checked_in);

        // Simulate a completed check-in
        store.insert(
            collections::RSVPS,
            "event1_user3",
            json!({
                "eventId": "event1",
                "userId": "user3",
                "status": "GOING",
                "checkedIn": true,
                "checkedInAt": 42,
                "createdAt": created.created_at.timestamp_millis(),
            }),
        );

        clock.advance(Duration::hours(1));
        let updated = service.set_status(&event, &user, RsvpStatus::Maybe).await.unwrap();

        assert_eq!(updated.status, RsvpStatus::Maybe);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.checked_in);

        let stored = service.get(&event, &user).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn colliding_id_is_not_overwritten_by_another_pair() {
        let store = InMemoryDocumentStore::new();
        let service = RsvpService::new(Arc::new(store.clone()), Arc::new(test_clock()));
        service
            .set_status(&"a_b".into(), &"c".into(), RsvpStatus::Going)
            .await
            .unwrap();

        let foreign = service
            .set_status(&"a".into(), &"b_c".into(), RsvpStatus::NotGoing)
            .await;
        assert_eq!(foreign, Err(CheckInError::KeyConflict("a_b_c".into())));

        let kept = service.get(&"a_b".into(), &"c".into()).await.unwrap().unwrap();
        assert_eq!(kept.status, RsvpStatus::Going);
        assert!(service.get(&"a".into(), &"b_c".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn counts_by_status() {
        let store = InMemoryDocumentStore::new();
        let service = RsvpService::new(Arc::new(store), Arc::new(test_clock()));
        let event = EventId::new("event1");

        for (user, status) in [
            ("a", RsvpStatus::Going),
            ("b", RsvpStatus::Going),
            ("c", RsvpStatus::Maybe),
            ("d", RsvpStatus::NotGoing),
        ] {
            service.set_status(&event, &user.into(), status).await.unwrap();
        }
        service
            .set_status(&"event2".into(), &"a".into(), RsvpStatus::Going)
            .await
            .unwrap();

        let counts = service.counts(&event).await.unwrap();
        assert_eq!(
            counts,
            RsvpCounts {
                going: 2,
                maybe: 1,
                not_going: 1,
                checked_in: 0,
            }
        );
        assert_eq!(service.for_user(&"a".into()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_all_removes_every_rsvp() {
        let store = InMemoryDocumentStore::new();
        let service = RsvpService::new(Arc::new(store.clone()), Arc::new(test_clock()));
        service
            .set_status(&"e".into(), &"u".into(), RsvpStatus::Going)
            .await
            .unwrap();

        assert_eq!(service.clear_all().await.unwrap(), 1);
        assert_eq!(store.len(collections::RSVPS), 0);
    }
}
