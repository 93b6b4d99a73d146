//! Owned RSVP status cache.
//!
//! Views that show "your RSVP" for many events keep one [`RsvpCache`] per
//! signed-in user session and pass it by `&mut`. Reads fall through to the
//! [`RsvpService`] on a miss; writes made through the cache update it in
//! place; [`RsvpCache::clear`] runs on logout.

use crate::error::Result;
use crate::rsvp::RsvpService;
use crate::types::{EventId, Rsvp, RsvpStatus, UserId};
use std::collections::HashMap;

/// RSVP statuses keyed by user, then event.
#[derive(Debug, Default, Clone)]
pub struct RsvpCache {
    entries: HashMap<UserId, HashMap<EventId, RsvpStatus>>,
}

impl RsvpCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached status without touching storage.
    #[must_use]
    pub fn get(&self, user_id: &UserId, event_id: &EventId) -> Option<RsvpStatus> {
        self.entries.get(user_id)?.get(event_id).copied()
    }

    /// Status for `(user, event)`, fetching and caching it on a miss.
    ///
    /// Returns `None` if the user has no RSVP; absence is not cached.
    ///
    /// # Errors
    ///
    /// Storage failures from the fetch.
    pub async fn status(
        &mut self,
        service: &RsvpService,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<Option<RsvpStatus>> {
        if let Some(status) = self.get(user_id, event_id) {
            tracing::trace!(user_id = %user_id, event_id = %event_id, "RSVP cache hit");
            return Ok(Some(status));
        }

        let fetched = service.get(event_id, user_id).await?;
        if let Some(rsvp) = &fetched {
            self.record(rsvp);
        }
        Ok(fetched.map(|rsvp| rsvp.status))
    }

    /// Write a status through the service and update the cache in place.
    ///
    /// # Errors
    ///
    /// Storage failures from the write; the cache is left unchanged.
    pub async fn set_status(
        &mut self,
        service: &RsvpService,
        event_id: &EventId,
        user_id: &UserId,
        status: RsvpStatus,
    ) -> Result<Rsvp> {
        let rsvp = service.set_status(event_id, user_id, status).await?;
        self.record(&rsvp);
        Ok(rsvp)
    }

    /// Store the status of a known RSVP.
    pub fn record(&mut self, rsvp: &Rsvp) {
        self.entries
            .entry(rsvp.user_id.clone())
            .or_default()
            .insert(rsvp.event_id.clone(), rsvp.status);
    }

    /// Drop everything (logout).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached (user, event) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
