//! Error types for check-in and the services around it.

use campus_events_core::document_store::DocumentError;
use thiserror::Error;

/// Why a check-in (or another service call) failed.
///
/// The messages are shown to organizers as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckInError {
    /// Scanned text is not `"eventId:userId"`.
    #[error("invalid QR code format")]
    InvalidFormat,

    /// The event named by the code does not exist.
    #[error("event not found")]
    EventNotFound,

    /// The user never RSVP'd to the event.
    #[error("no RSVP found for this user")]
    RsvpNotFound,

    /// An attendance record already exists for this (event, user).
    #[error("user already checked in")]
    AlreadyCheckedIn,

    /// The record id is already taken by a different (event, user) pair.
    #[error("record id {0} belongs to another event or user")]
    KeyConflict(String),

    /// The document store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Coarse classification of [`CheckInError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input
    Format,
    /// Referenced data does not exist
    NotFound,
    /// Operation conflicts with current state
    Conflict,
    /// Backend or network failure
    Transport,
}

impl ErrorKind {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transport => "transport",
        }
    }
}

impl CheckInError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat => ErrorKind::Format,
            Self::EventNotFound | Self::RsvpNotFound => ErrorKind::NotFound,
            Self::AlreadyCheckedIn | Self::KeyConflict(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Transport,
        }
    }

    /// Whether trying the same operation again could succeed.
    ///
    /// Only transport failures are retryable; nothing in this crate retries
    /// automatically.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

impl From<DocumentError> for CheckInError {
    fn from(error: DocumentError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Result alias for service calls.
pub type Result<T> = std::result::Result<T, CheckInError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_organizer_copy() {
        assert_eq!(CheckInError::InvalidFormat.to_string(), "invalid QR code format");
        assert_eq!(CheckInError::EventNotFound.to_string(), "event not found");
        assert_eq!(CheckInError::RsvpNotFound.to_string(), "no RSVP found for this user");
        assert_eq!(CheckInError::AlreadyCheckedIn.to_string(), "user already checked in");
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(CheckInError::Storage("timeout".into()).is_retryable());
        assert!(!CheckInError::AlreadyCheckedIn.is_retryable());
        assert!(!CheckInError::InvalidFormat.is_retryable());
        assert_eq!(CheckInError::RsvpNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(CheckInError::KeyConflict("a_b_c".into()).kind(), ErrorKind::Conflict);
    }

    #[test]
    fn document_errors_become_storage_errors() {
        let error: CheckInError = DocumentError::Database("connection reset".into()).into();
        assert_eq!(
            error,
            CheckInError::Storage("Database error: connection reset".into())
        );
    }
}
