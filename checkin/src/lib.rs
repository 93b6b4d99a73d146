//! Campus Check-In - RSVPs and QR code attendance for university events
//!
//! Users RSVP to events; at the door an organizer scans the attendee's QR
//! code and the scan is turned into exactly one attendance record.
//!
//! # Architecture
//!
//! ```text
//!  QR text "eventId:userId"
//!          │
//!          ▼
//!  ┌────────────────┐   effect    ┌────────────────┐   batch   ┌──────────────────┐
//!  │ ScannerSession │ ──────────▶ │ CheckInService │ ────────▶ │  DocumentStore   │
//!  │   (reducer)    │ ◀────────── │                │           │ (memory|postgres)│
//!  └────────────────┘   result    └────────────────┘           └──────────────────┘
//!                                                                  ▲    ▲    ▲
//!                         RsvpService ─────────────────────────────┘    │    │
//!                         AttendanceLedger ─────────────────────────────┘    │
//!                         EventDirectory ────────────────────────────────────┘
//! ```
//!
//! # Storage layout
//!
//! | Collection    | Document id         | Type                       |
//! |---------------|---------------------|----------------------------|
//! | `rsvps`       | `{eventId}_{userId}`| [`types::Rsvp`]            |
//! | `attendance`  | `{eventId}_{userId}`| [`types::Attendance`]      |
//! | `events`      | event id            | [`types::Event`]           |
//! | `users`       | user id             | [`types::User`]            |
//! | `categories`  | category id         | [`types::Category`]        |
//! | `departments` | department id       | [`types::Department`]      |
//!
//! The attendance record is authoritative. The RSVP's `checkedIn` flag is
//! written in the same conditional batch, so the two never disagree and two
//! organizers scanning the same code at once produce one check-in.

pub mod attendance;
pub mod cache;
pub mod check_in;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod qr;
pub mod repository;
pub mod rsvp;
pub mod seed;
pub mod types;

pub use attendance::AttendanceLedger;
pub use cache::RsvpCache;
pub use check_in::{CheckInEnvironment, CheckInService, ScanStatus, ScannerSession};
pub use config::Config;
pub use error::{CheckInError, ErrorKind};
pub use events::EventDirectory;
pub use qr::{QrCodec, QrError, QrPayload};
pub use rsvp::RsvpService;
