//! Domain types for campus events: identifiers, RSVPs, attendance records,
//! events and the directory entries they reference.
//!
//! Every type here is stored as a JSON document with camelCase field names.
//! Timestamps are serialized as integer milliseconds since the Unix epoch so
//! ordered queries sort chronologically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Collections
// ============================================================================

/// Names of the document collections.
pub mod collections {
    /// User profiles
    pub const USERS: &str = "users";
    /// Events
    pub const EVENTS: &str = "events";
    /// RSVPs, keyed by composite id
    pub const RSVPS: &str = "rsvps";
    /// Attendance records, keyed by composite id
    pub const ATTENDANCE: &str = "attendance";
    /// Event categories
    pub const CATEGORIES: &str = "categories";
    /// University departments
    pub const DEPARTMENTS: &str = "departments";
}

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of an event document
    EventId
);

string_id!(
    /// Identifier of a user, as supplied by authentication
    UserId
);

/// Document id shared by an RSVP and its attendance record: `"{eventId}_{userId}"`.
///
/// Deterministic, so at most one RSVP and one attendance record exist per
/// (event, user) pair without any coordination. Not injective: `("a_b", "c")`
/// and `("a", "b_c")` share an id, so readers compare the stored ids too.
#[must_use]
pub fn composite_id(event_id: &EventId, user_id: &UserId) -> String {
    format!("{event_id}_{user_id}")
}

// ============================================================================
// RSVP
// ============================================================================

/// A user's stated intent to attend an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RsvpStatus {
    /// Plans to attend
    Going,
    /// Undecided
    Maybe,
    /// Will not attend
    NotGoing,
}

impl RsvpStatus {
    /// Stored representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Going => "GOING",
            Self::Maybe => "MAYBE",
            Self::NotGoing => "NOT_GOING",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "GOING" => Ok(Self::Going),
            "MAYBE" => Ok(Self::Maybe),
            "NOT_GOING" => Ok(Self::NotGoing),
            other => Err(format!("unknown RSVP status: {other}")),
        }
    }
}

/// RSVP record (collection `rsvps`, id [`composite_id`]).
///
/// `checked_in` and `checked_in_at` mirror the attendance ledger and are only
/// written in the same batch that creates the [`Attendance`] record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    /// Event
    pub event_id: EventId,
    /// Attendee
    pub user_id: UserId,
    /// Current intent
    pub status: RsvpStatus,
    /// Whether the attendee has been checked in
    #[serde(default)]
    pub checked_in: bool,
    /// When the attendee was checked in
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub checked_in_at: Option<DateTime<Utc>>,
    /// When the RSVP was first created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Rsvp {
    /// Document id of this RSVP
    #[must_use]
    pub fn id(&self) -> String {
        composite_id(&self.event_id, &self.user_id)
    }

    /// Whether this RSVP is for exactly `(event_id, user_id)`.
    ///
    /// [`composite_id`] can map two pairs to one id when ids contain `_`, so
    /// a record fetched by id is checked before it is trusted.
    #[must_use]
    pub fn belongs_to(&self, event_id: &EventId, user_id: &UserId) -> bool {
        self.event_id == *event_id && self.user_id == *user_id
    }
}

/// Per-status RSVP totals for one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpCounts {
    /// RSVPs with status `GOING`
    pub going: usize,
    /// RSVPs with status `MAYBE`
    pub maybe: usize,
    /// RSVPs with status `NOT_GOING`
    pub not_going: usize,
    /// RSVPs flagged as checked in, regardless of status
    pub checked_in: usize,
}

// ============================================================================
// Attendance
// ============================================================================

/// Authoritative record that a user was checked in (collection `attendance`).
///
/// Created once by the check-in write path and never updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    /// Event
    pub event_id: EventId,
    /// Attendee
    pub user_id: UserId,
    /// When the attendee was checked in
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub check_in_time: DateTime<Utc>,
    /// Organizer who performed the check-in
    pub organizer_id: UserId,
    /// Free-form organizer notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Attendance {
    /// Document id of this record
    #[must_use]
    pub fn id(&self) -> String {
        composite_id(&self.event_id, &self.user_id)
    }

    /// Whether this record is for exactly `(event_id, user_id)`.
    #[must_use]
    pub fn belongs_to(&self, event_id: &EventId, user_id: &UserId) -> bool {
        self.event_id == *event_id && self.user_id == *user_id
    }
}

// ============================================================================
// Events and directory entries
// ============================================================================

/// Where an event takes place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Venue name
    pub name: String,
    /// Latitude in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Location {
    /// Location with a name only
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latitude: None,
            longitude: None,
        }
    }
}

/// An event users can RSVP to (collection `events`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Document id
    pub id: EventId,
    /// Title shown in listings
    pub title: String,
    /// Long description
    #[serde(default)]
    pub description: String,
    /// Venue
    pub location: Location,
    /// Start time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub starts_at: DateTime<Utc>,
    /// End time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ends_at: DateTime<Utc>,
    /// Organizer who owns the event
    pub organizer_id: UserId,
    /// Category, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Hosting department, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    /// Maximum attendees, if limited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Creation time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Event category (collection `categories`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Document id
    pub id: String,
    /// Display name
    pub name: String,
}

/// University department (collection `departments`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Document id
    pub id: String,
    /// Display name
    pub name: String,
    /// Short code such as `CS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// What a user is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Browses events and RSVPs
    Student,
    /// Creates events and checks attendees in
    Organizer,
    /// Full access
    Admin,
}

/// User profile (collection `users`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Document id
    pub id: UserId,
    /// Name shown to other users
    pub display_name: String,
    /// Contact address
    pub email: String,
    /// Permissions
    pub role: Role,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn composite_id_is_deterministic() {
        let event = EventId::new("event1");
        let user = UserId::new("user3");
        assert_eq!(composite_id(&event, &user), "event1_user3");
        assert_eq!(composite_id(&event, &user), composite_id(&event, &user));
        assert_ne!(
            composite_id(&event, &user),
            composite_id(&event, &UserId::new("user4"))
        );
        assert_ne!(
            composite_id(&event, &user),
            composite_id(&EventId::new("event2"), &user)
        );
    }

    #[test]
    fn belongs_to_separates_pairs_sharing_an_id() {
        let (left, right) = (
            (EventId::new("a_b"), UserId::new("c")),
            (EventId::new("a"), UserId::new("b_c")),
        );
        assert_eq!(composite_id(&left.0, &left.1), composite_id(&right.0, &right.1));

        let rsvp = Rsvp {
            event_id: left.0.clone(),
            user_id: left.1.clone(),
            status: RsvpStatus::Going,
            checked_in: false,
            checked_in_at: None,
            created_at: DateTime::UNIX_EPOCH,
        };
        assert!(rsvp.belongs_to(&left.0, &left.1));
        assert!(!rsvp.belongs_to(&right.0, &right.1));
    }

    #[test]
    fn rsvp_serializes_camel_case_with_millis() {
        let created = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let rsvp = Rsvp {
            event_id: "event1".into(),
            user_id: "user3".into(),
            status: RsvpStatus::NotGoing,
            checked_in: false,
            checked_in_at: None,
            created_at: created,
        };

        let value = serde_json::to_value(&rsvp).unwrap();
        assert_eq!(
            value,
            json!({
                "eventId": "event1",
                "userId": "user3",
                "status": "NOT_GOING",
                "checkedIn": false,
                "checkedInAt": null,
                "createdAt": 1_700_000_000_123_i64,
            })
        );
        assert_eq!(serde_json::from_value::<Rsvp>(value).unwrap(), rsvp);
    }

    #[test]
    fn rsvp_without_check_in_fields_deserializes() {
        let rsvp: Rsvp = serde_json::from_value(json!({
            "eventId": "e",
            "userId": "u",
            "status": "MAYBE",
            "createdAt": 0,
        }))
        .unwrap();
        assert!(!rsvp.checked_in);
        assert_eq!(rsvp.checked_in_at, None);
    }

    #[test]
    fn status_parses_loosely() {
        assert_eq!("going".parse::<RsvpStatus>(), Ok(RsvpStatus::Going));
        assert_eq!("not-going".parse::<RsvpStatus>(), Ok(RsvpStatus::NotGoing));
        assert!("later".parse::<RsvpStatus>().is_err());
    }
}
