//! Attendance ledger.
//!
//! The `attendance` collection is the authoritative answer to "did this
//! person attend". The RSVP `checkedIn`/`checkedInAt` fields are a
//! denormalized copy and are only ever written by [`AttendanceLedger::commit`],
//! in the same atomic batch that creates the attendance record:
//!
//! - the attendance document must not exist yet
//! - if the RSVP is touched, it must still have `checkedIn == false`
//!
//! Either precondition failing means someone else checked the user in first,
//! and nothing is written.

use crate::error::{CheckInError, Result};
use crate::repository::{Collection, to_document};
use crate::types::{Attendance, EventId, Rsvp, UserId, collections, composite_id};
use campus_events_core::document_store::{
    Direction, DocumentError, DocumentStore, Precondition, WriteBatch,
};
use campus_events_core::environment::Clock;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;

/// Reads and writes attendance records.
#[derive(Clone)]
pub struct AttendanceLedger {
    documents: Arc<dyn DocumentStore>,
    records: Collection<Attendance>,
    rsvps: Collection<Rsvp>,
    clock: Arc<dyn Clock>,
}

impl AttendanceLedger {
    /// Create a ledger over `documents`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Collection::new(Arc::clone(&documents), collections::ATTENDANCE),
            rsvps: Collection::new(Arc::clone(&documents), collections::RSVPS),
            documents,
            clock,
        }
    }

    /// Write an attendance record and, if `rsvp_present`, flag the RSVP, atomically.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::AlreadyCheckedIn`]: a precondition failed
    /// - [`CheckInError::RsvpNotFound`]: the RSVP vanished since it was read
    /// - [`CheckInError::Storage`]: the store failed
    pub async fn commit(&self, attendance: &Attendance, rsvp_present: bool) -> Result<()> {
        let key = attendance.id();
        let mut batch =
            WriteBatch::new().create(collections::ATTENDANCE, &key, to_document(attendance)?);

        if rsvp_present {
            batch = batch.merge(
                collections::RSVPS,
                &key,
                json!({
                    "checkedIn": true,
                    "checkedInAt": attendance.check_in_time.timestamp_millis(),
                }),
                Some(Precondition::field_equals("checkedIn", false)),
            );
        }

        match self.documents.commit(batch).await {
            Ok(()) => Ok(()),
            Err(DocumentError::PreconditionFailed { reason, .. }) => {
                tracing::debug!(
                    attendance_id = %key,
                    reason = %reason,
                    "Check-in lost to an earlier write"
                );
                match self.records.get(&key).await? {
                    Some(existing)
                        if !existing.belongs_to(&attendance.event_id, &attendance.user_id) =>
                    {
                        Err(CheckInError::KeyConflict(key))
                    },
                    _ => Err(CheckInError::AlreadyCheckedIn),
                }
            },
            Err(DocumentError::NotFound { .. }) => Err(CheckInError::RsvpNotFound),
            Err(error) => Err(error.into()),
        }
    }

    /// Record attendance on an organizer's behalf and return the record id.
    ///
    /// No RSVP is required, so walk-ins can be recorded; an existing RSVP is
    /// flagged as checked in by the same write.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::AlreadyCheckedIn`]: a record already exists
    /// - [`CheckInError::KeyConflict`]: the record id is held by another pair
    /// - [`CheckInError::Storage`]: the store failed
    #[tracing::instrument(
        skip(self, notes),
        fields(event_id = %event_id, user_id = %user_id, organizer_id = %organizer_id)
    )]
    pub async fn record_attendance(
        &self,
        event_id: &EventId,
        user_id: &UserId,
        organizer_id: &UserId,
        notes: Option<String>,
    ) -> Result<String> {
        let key = composite_id(event_id, user_id);

        if let Some(existing) = self.records.get(&key).await? {
            if existing.belongs_to(event_id, user_id) {
                return Err(CheckInError::AlreadyCheckedIn);
            }
            return Err(CheckInError::KeyConflict(key));
        }
        let rsvp_present = match self.rsvps.get(&key).await? {
            Some(rsvp) if !rsvp.belongs_to(event_id, user_id) => {
                return Err(CheckInError::KeyConflict(key));
            },
            found => found.is_some(),
        };

        let attendance = Attendance {
            event_id: event_id.clone(),
            user_id: user_id.clone(),
            check_in_time: self.clock.now(),
            organizer_id: organizer_id.clone(),
            notes,
        };
        self.commit(&attendance, rsvp_present).await?;

        tracing::info!(attendance_id = %key, rsvp_present, "Attendance recorded");
        metrics::counter!("attendance.recorded").increment(1);
        Ok(key)
    }

    /// Attendance record for one (event, user), if any.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn get(&self, event_id: &EventId, user_id: &UserId) -> Result<Option<Attendance>> {
        Ok(self
            .records
            .get(&composite_id(event_id, user_id))
            .await?
            .filter(|record| record.belongs_to(event_id, user_id)))
    }

    /// Every attendance record for an event, newest first.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn for_event(&self, event_id: &EventId) -> Result<Vec<Attendance>> {
        Ok(self
            .records
            .fetch(
                self.records
                    .query()
                    .where_eq("eventId", event_id.as_str())
                    .order_by("checkInTime", Direction::Descending),
            )
            .await?)
    }

    /// Live view of an event's attendance, newest first.
    ///
    /// Yields the current list immediately and a full fresh list after every
    /// change. Dropping the stream ends the subscription.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the subscription can't be opened.
    pub async fn watch_event(
        &self,
        event_id: &EventId,
    ) -> Result<impl Stream<Item = Result<Vec<Attendance>>> + Send + use<>> {
        let snapshots = self
            .records
            .watch(
                self.records
                    .query()
                    .where_eq("eventId", event_id.as_str())
                    .order_by("checkInTime", Direction::Descending),
            )
            .await?;
        Ok(snapshots.map(|snapshot| snapshot.map_err(CheckInError::from)))
    }

    /// Number of attendees checked in to an event.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn count(&self, event_id: &EventId) -> Result<usize> {
        let records = self
            .documents
            .query(self.records.query().where_eq("eventId", event_id.as_str()))
            .await?;
        Ok(records.len())
    }

    /// Delete every attendance record.
    ///
    /// # Errors
    ///
    /// [`CheckInError::Storage`] if the store fails.
    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.records.clear().await?;
        tracing::warn!(removed, "Cleared all attendance records");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campus_events_testing::{FixedClock, InMemoryDocumentStore, test_clock};
    use chrono::Duration;

    fn ledger(store: &InMemoryDocumentStore) -> (AttendanceLedger, FixedClock) {
        let clock = test_clock();
        (
            AttendanceLedger::new(Arc::new(store.clone()), Arc::new(clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn walk_in_is_recorded_without_rsvp() {
        let store = InMemoryDocumentStore::new();
        let (ledger, _) = ledger(&store);

        let key = ledger
            .record_attendance(
                &"event1".into(),
                &"user3".into(),
                &"org1".into(),
                Some("walk-in".into()),
            )
            .await
            .unwrap();

        assert_eq!(key, "event1_user3");
        let record = ledger
            .get(&"event1".into(), &"user3".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.organizer_id.as_str(), "org1");
        assert_eq!(record.notes.as_deref(), Some("walk-in"));
        assert_eq!(store.len(collections::RSVPS), 0);
    }

    #[tokio::test]
    async fn second_recording_is_a_duplicate() {
        let store = InMemoryDocumentStore::new();
        let (ledger, _) = ledger(&store);
        let (event, user, org) = ("event1".into(), "user3".into(), "org1".into());

        ledger.record_attendance(&event, &user, &org, None).await.unwrap();
        let second = ledger.record_attendance(&event, &user, &org, None).await;

        assert_eq!(second, Err(CheckInError::AlreadyCheckedIn));
        assert_eq!(ledger.count(&event).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn existing_rsvp_is_flagged_in_same_write() {
        let store = InMemoryDocumentStore::new();
        store.insert(
            collections::RSVPS,
            "event1_user3",
            json!({
                "eventId": "event1",
                "userId": "user3",
                "status": "GOING",
                "checkedIn": false,
                "createdAt": 0,
            }),
        );
        let (ledger, clock) = ledger(&store);

        ledger
            .record_attendance(&"event1".into(), &"user3".into(), &"org1".into(), None)
            .await
            .unwrap();

        let rsvp = store.document(collections::RSVPS, "event1_user3").unwrap();
        assert_eq!(rsvp["checkedIn"], json!(true));
        assert_eq!(rsvp["checkedInAt"], json!(clock.now().timestamp_millis()));
    }

    #[tokio::test]
    async fn for_event_lists_newest_first() {
        let store = InMemoryDocumentStore::new();
        let (ledger, clock) = ledger(&store);
        let org = UserId::new("org1");

        for user in ["a", "b", "c"] {
            ledger
                .record_attendance(&"event1".into(), &user.into(), &org, None)
                .await
                .unwrap();
            clock.advance(Duration::seconds(5));
        }
        ledger
            .record_attendance(&"event2".into(), &"a".into(), &org, None)
            .await
            .unwrap();

        let users: Vec<String> = ledger
            .for_event(&"event1".into())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.user_id.to_string())
            .collect();
        assert_eq!(users, ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn colliding_ids_do_not_cross_pairs() {
        // ("a_b", "c") and ("a", "b_c") both map to "a_b_c"
        let store = InMemoryDocumentStore::new();
        store.insert(
            collections::RSVPS,
            "a_b_c",
            json!({
                "eventId": "a_b",
                "userId": "c",
                "status": "GOING",
                "checkedIn": false,
                "createdAt": 0,
            }),
        );
        let (ledger, _) = ledger(&store);
        let org = UserId::new("org1");

        let foreign = ledger
            .record_attendance(&"a".into(), &"b_c".into(), &org, None)
            .await;
        assert_eq!(foreign, Err(CheckInError::KeyConflict("a_b_c".into())));
        assert_eq!(store.len(collections::ATTENDANCE), 0);
        assert_eq!(
            store.document(collections::RSVPS, "a_b_c").unwrap()["checkedIn"],
            json!(false)
        );

        ledger
            .record_attendance(&"a_b".into(), &"c".into(), &org, None)
            .await
            .unwrap();
        let after = ledger
            .record_attendance(&"a".into(), &"b_c".into(), &org, None)
            .await;
        assert_eq!(after, Err(CheckInError::KeyConflict("a_b_c".into())));
        let duplicate = ledger
            .record_attendance(&"a_b".into(), &"c".into(), &org, None)
            .await;
        assert_eq!(duplicate, Err(CheckInError::AlreadyCheckedIn));
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        store.insert(
            collections::RSVPS,
            "event1_user3",
            json!({
                "eventId": "event1",
                "userId": "user3",
                "status": "GOING",
                "checkedIn": false,
                "createdAt": 0,
            }),
        );
        let (ledger, clock) = ledger(&store);
        let attendance = Attendance {
            event_id: "event1".into(),
            user_id: "user3".into(),
            check_in_time: clock.now(),
            organizer_id: "org1".into(),
            notes: None,
        };

        store.fail_next("disk full");
        let error = ledger.commit(&attendance, true).await.unwrap_err();
        assert!(error.is_retryable());

        assert_eq!(store.len(collections::ATTENDANCE), 0);
        let rsvp = store.document(collections::RSVPS, "event1_user3").unwrap();
        assert_eq!(rsvp["checkedIn"], json!(false));

        ledger.commit(&attendance, true).await.unwrap();
        assert_eq!(store.len(collections::ATTENDANCE), 1);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_as_transport_error() {
        let store = InMemoryDocumentStore::new();
        let (ledger, _) = ledger(&store);
        store.set_unavailable(true);

        let result = ledger
            .record_attendance(&"event1".into(), &"user3".into(), &"org1".into(), None)
            .await;
        assert!(result.unwrap_err().is_retryable());
    }
}
