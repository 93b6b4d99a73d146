//! Environment for the check-in reducer.

use super::service::CheckInService;
use crate::types::UserId;
use campus_events_core::document_store::DocumentStore;
use campus_events_core::environment::Clock;
use std::sync::Arc;

/// Dependencies of a scanner session.
///
/// The organizer identity comes from authentication and is fixed for the
/// lifetime of the session.
#[derive(Clone)]
pub struct CheckInEnvironment {
    clock: Arc<dyn Clock>,
    service: CheckInService,
    organizer_id: UserId,
}

impl CheckInEnvironment {
    /// Create an environment for `organizer_id`.
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        organizer_id: UserId,
    ) -> Self {
        Self {
            service: CheckInService::new(documents, Arc::clone(&clock)),
            clock,
            organizer_id,
        }
    }

    /// Clock for timestamps.
    ///
    /// Production uses `SystemClock`, tests use `FixedClock`.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Service that performs the check-in
    #[must_use]
    pub const fn service(&self) -> &CheckInService {
        &self.service
    }

    /// Organizer operating the scanner
    #[must_use]
    pub const fn organizer_id(&self) -> &UserId {
        &self.organizer_id
    }
}
