//! # Campus Events Testing
//!
//! Testing utilities and in-memory backends for the campus events services.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`InMemoryDocumentStore`]: a `DocumentStore` with atomic batches, live
//!   subscriptions and failure injection
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use campus_events_testing::{InMemoryDocumentStore, test_clock};
//!
//! #[tokio::test]
//! async fn scan_checks_in() {
//!     let documents = InMemoryDocumentStore::new();
//!     documents.insert("events", "event1", json!({ "title": "Hackathon" }));
//!     // ... build a scanner session against `documents` and `test_clock()`
//! }
//! ```

use campus_events_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub mod document_store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, Mutex, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same instant until explicitly advanced. Clones share the
    /// same instant, so a test can advance time seen by an environment it
    /// already handed a clone to.
    ///
    /// # Example
    ///
    /// ```
    /// use campus_events_testing::mocks::FixedClock;
    /// use campus_events_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// assert_eq!(before, clock.now());
    ///
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - before, Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }

        /// Jump to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.lock() {
                *time = to;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use document_store::InMemoryDocumentStore;
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::ReducerTest;
