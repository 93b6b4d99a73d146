//! The check-in itself: validate a scanned code and record attendance once.

use super::types::CheckInReceipt;
use crate::attendance::AttendanceLedger;
use crate::error::{CheckInError, Result};
use crate::qr::QrPayload;
use crate::repository::Collection;
use crate::types::{Attendance, Rsvp, UserId, collections, composite_id};
use campus_events_core::document_store::DocumentStore;
use campus_events_core::environment::Clock;
use std::sync::Arc;

/// Validates scanned codes and writes check-ins.
#[derive(Clone)]
pub struct CheckInService {
    documents: Arc<dyn DocumentStore>,
    rsvps: Collection<Rsvp>,
    ledger: AttendanceLedger,
    clock: Arc<dyn Clock>,
}

impl CheckInService {
    /// Create a service over `documents`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rsvps: Collection::new(Arc::clone(&documents), collections::RSVPS),
            ledger: AttendanceLedger::new(Arc::clone(&documents), Arc::clone(&clock)),
            documents,
            clock,
        }
    }

    /// Check in the attendee named by scanned `text`.
    ///
    /// Checks run in order and the first failure wins:
    ///
    /// 1. `text` is `"eventId:userId"`
    /// 2. the event exists
    /// 3. the user has an RSVP for it
    /// 4. the RSVP is not already checked in
    ///
    /// The write itself is conditional, so a concurrent check-in of the same
    /// code that slips past step 4 still fails with
    /// [`CheckInError::AlreadyCheckedIn`].
    ///
    /// # Errors
    ///
    /// The first failed check, or [`CheckInError::Storage`].
    #[tracing::instrument(skip(self), fields(organizer_id = %organizer_id))]
    pub async fn check_in(&self, text: &str, organizer_id: &UserId) -> Result<CheckInReceipt> {
        metrics::counter!("checkin.attempts").increment(1);

        let result = self.validate_and_record(text, organizer_id).await;
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkin.succeeded").increment(1);
                tracing::info!(
                    event_id = %receipt.event_id,
                    user_id = %receipt.user_id,
                    "Attendee checked in"
                );
            },
            Err(error) => {
                metrics::counter!("checkin.failed", "kind" => error.kind().as_str()).increment(1);
                if error.is_retryable() {
                    tracing::warn!(%error, "Check-in failed");
                } else {
                    tracing::info!(%error, "Check-in rejected");
                }
            },
        }
        result
    }

    async fn validate_and_record(
        &self,
        text: &str,
        organizer_id: &UserId,
    ) -> Result<CheckInReceipt> {
        let payload = QrPayload::decode(text).map_err(|_| CheckInError::InvalidFormat)?;
        let (event_id, user_id) = (payload.event_id(), payload.user_id());

        if self
            .documents
            .get(collections::EVENTS, event_id.as_str())
            .await?
            .is_none()
        {
            return Err(CheckInError::EventNotFound);
        }

        let key = composite_id(event_id, user_id);
        let Some(rsvp) = self
            .rsvps
            .get(&key)
            .await?
            .filter(|rsvp| rsvp.belongs_to(event_id, user_id))
        else {
            return Err(CheckInError::RsvpNotFound);
        };
        if rsvp.checked_in {
            return Err(CheckInError::AlreadyCheckedIn);
        }

        let attendance = Attendance {
            event_id: event_id.clone(),
            user_id: user_id.clone(),
            check_in_time: self.clock.now(),
            organizer_id: organizer_id.clone(),
            notes: None,
        };
        self.ledger.commit(&attendance, true).await?;

        Ok(CheckInReceipt {
            event_id: attendance.event_id,
            user_id: attendance.user_id,
            organizer_id: attendance.organizer_id,
            attendance_id: key,
            checked_in_at: attendance.check_in_time,
        })
    }
}
