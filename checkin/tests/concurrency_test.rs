//! Concurrent check-ins of the same code.
//!
//! Several organizers scanning one attendee at the same moment must produce
//! exactly one attendance record; everyone else sees "already checked in".
//!
//! Run with: `cargo test --test concurrency_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use campus_checkin::types::{Attendance, EventId, UserId, collections};
use campus_checkin::{AttendanceLedger, CheckInError, CheckInService, EventDirectory, seed};
use campus_events_core::document_store::DocumentStore;
use campus_events_core::environment::Clock;
use campus_events_testing::{InMemoryDocumentStore, test_clock};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

async fn seeded() -> (InMemoryDocumentStore, Arc<dyn DocumentStore>, Arc<dyn Clock>) {
    let store = InMemoryDocumentStore::new();
    let documents: Arc<dyn DocumentStore> = Arc::new(store.clone());
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    seed::seed(Arc::clone(&documents), Arc::clone(&clock))
        .await
        .unwrap();
    (store, documents, clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_check_in_exactly_once() {
    let (store, documents, clock) = seeded().await;
    let service = Arc::new(CheckInService::new(documents, clock));

    let mut tasks = Vec::new();
    for n in 0..16 {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            service
                .check_in("careerfair:student1", &UserId::new(format!("org{n}")))
                .await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(error) => assert_eq!(error, CheckInError::AlreadyCheckedIn),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(store.len(collections::ATTENDANCE), 1);
    let rsvp = store
        .document(collections::RSVPS, "careerfair_student1")
        .unwrap();
    assert_eq!(rsvp["checkedIn"], json!(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scan_and_manual_record_race_to_one_record() {
    let (store, documents, clock) = seeded().await;
    let service = CheckInService::new(Arc::clone(&documents), Arc::clone(&clock));
    let ledger = AttendanceLedger::new(documents, clock);
    let (event, user, organizer) = (
        EventId::new("jazznight"),
        UserId::new("student1"),
        UserId::new("org1"),
    );

    let (scanned, recorded) = tokio::join!(
        service.check_in("jazznight:student1", &organizer),
        ledger.record_attendance(&event, &user, &organizer, None),
    );

    assert!(scanned.is_ok() ^ recorded.is_ok());
    assert_eq!(store.len(collections::ATTENDANCE), 1);
}

#[tokio::test]
async fn unavailable_store_rejects_scan_without_writes() {
    let (store, documents, clock) = seeded().await;
    let directory = EventDirectory::new(Arc::clone(&documents));
    assert!(directory.get(&"careerfair".into()).await.unwrap().is_some());

    let service = CheckInService::new(documents, clock);
    store.set_unavailable(true);
    let error = service
        .check_in("careerfair:student1", &UserId::new("org1"))
        .await
        .unwrap_err();
    assert!(error.is_retryable());
    store.set_unavailable(false);

    assert_eq!(store.len(collections::ATTENDANCE), 0);
    service
        .check_in("careerfair:student1", &UserId::new("org1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_rsvp_flag_rolls_back_attendance_create() {
    let (store, documents, clock) = seeded().await;
    let ledger = AttendanceLedger::new(documents, Arc::clone(&clock));

    // RSVP already flagged, but no attendance record: the create alone would succeed
    store.insert(
        collections::RSVPS,
        "careerfair_student1",
        json!({
            "eventId": "careerfair",
            "userId": "student1",
            "status": "GOING",
            "checkedIn": true,
            "checkedInAt": 0,
            "createdAt": 0,
        }),
    );
    let attendance = Attendance {
        event_id: EventId::new("careerfair"),
        user_id: UserId::new("student1"),
        check_in_time: clock.now(),
        organizer_id: UserId::new("org1"),
        notes: None,
    };

    let result = ledger.commit(&attendance, true).await;

    assert_eq!(result, Err(CheckInError::AlreadyCheckedIn));
    assert_eq!(store.len(collections::ATTENDANCE), 0);
}

proptest! {
    #[test]
    fn only_well_formed_codes_pass_the_format_check(
        event in "[a-z0-9]{0,8}",
        user in "[a-z0-9]{0,8}",
        sep in prop::sample::select(vec![":", "::", "-", ""]),
    ) {
        let text = format!("{event}{sep}{user}");
        let expected = sep == ":" && !event.is_empty() && !user.is_empty();
        prop_assert_eq!(campus_checkin::qr::is_valid_format(&text), expected);
    }
}
