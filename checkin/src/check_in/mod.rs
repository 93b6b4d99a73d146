//! QR check-in workflow.
//!
//! An organizer's scanner session is a small state machine:
//!
//! ```text
//!            QrScanned                 CheckInSucceeded
//!   Idle ───────────────▶ Processing ───────────────────▶ Success
//!    ▲                        │                              │
//!    │                        │ CheckInFailed                │
//!    │                        ▼                              │
//!    ├───────────────────── Error                            │
//!    │       ScanAnother                                     │
//!    └───────────────────────────────────────────────────────┘
//!                          ScanAnother
//! ```
//!
//! The reducer ([`CheckInReducer`]) only moves between states and starts the
//! check-in as an effect. [`CheckInService`] runs the checks in order
//! (format, event, RSVP, already checked in) and commits through the
//! attendance ledger's single write path. [`ScannerSession`] wraps the
//! runtime `Store` for callers that want "scan and tell me what happened".
//!
//! A scan that arrives while a check-in is in flight is ignored.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod service;
pub mod store;
pub mod types;

pub use actions::CheckInAction;
pub use environment::CheckInEnvironment;
pub use reducer::CheckInReducer;
pub use service::CheckInService;
pub use store::ScannerSession;
pub use types::{CheckInReceipt, CheckInState, ScanStatus};
