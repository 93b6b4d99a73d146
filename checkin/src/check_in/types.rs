//! State types for the scanner session.

use crate::error::CheckInError;
use crate::types::{EventId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What was written by a successful check-in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInReceipt {
    /// Event
    pub event_id: EventId,
    /// Attendee
    pub user_id: UserId,
    /// Organizer who scanned the code
    pub organizer_id: UserId,
    /// Id of the attendance record (and of the RSVP)
    pub attendance_id: String,
    /// Time written to both documents
    pub checked_in_at: DateTime<Utc>,
}

/// Where the scanner is in the workflow.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ScanStatus {
    /// Waiting for a code
    #[default]
    Idle,
    /// A check-in is in flight
    Processing {
        /// Scanned text
        text: String,
        /// When the scan was accepted
        started_at: DateTime<Utc>,
    },
    /// The last scan checked someone in
    Success(CheckInReceipt),
    /// The last scan was rejected
    Error(CheckInError),
}

impl ScanStatus {
    /// Whether a check-in is in flight
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }

    /// Whether a result is being shown
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }

    /// Short label for logs and the CLI
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing { .. } => "processing",
            Self::Success(_) => "success",
            Self::Error(_) => "error",
        }
    }
}

/// Scanner session state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckInState {
    /// Current workflow position
    pub status: ScanStatus,
    /// Successful check-ins this session
    pub checked_in: u32,
    /// Rejected scans this session
    pub rejected: u32,
}

impl CheckInState {
    /// Fresh idle session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
