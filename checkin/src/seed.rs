//! Demo data for local development.

use crate::error::Result;
use crate::events::EventDirectory;
use crate::repository::Collection;
use crate::rsvp::RsvpService;
use crate::types::{
    Category, Department, Event, EventId, Location, Role, RsvpStatus, User, UserId, collections,
};
use campus_events_core::document_store::DocumentStore;
use campus_events_core::environment::Clock;
use chrono::Duration;
use std::sync::Arc;

/// What [`seed`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedSummary {
    /// Users written
    pub users: usize,
    /// Events written
    pub events: usize,
    /// RSVPs written
    pub rsvps: usize,
}

/// Write a small campus: two departments, three categories, three events,
/// one organizer and three students with RSVPs.
///
/// Documents are overwritten by id, so seeding twice is harmless. Existing
/// check-ins are kept.
///
/// # Errors
///
/// [`crate::CheckInError::Storage`] if the store fails.
#[tracing::instrument(skip_all)]
pub async fn seed(
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
) -> Result<SeedSummary> {
    let now = clock.now();
    let directory = EventDirectory::new(Arc::clone(&documents));
    let rsvps = RsvpService::new(Arc::clone(&documents), clock);
    let users: Collection<User> = Collection::new(documents, collections::USERS);

    for (id, name) in [("academic", "Academic"), ("music", "Music"), ("sports", "Sports")] {
        directory
            .put_category(&Category {
                id: id.into(),
                name: name.into(),
            })
            .await?;
    }
    for (id, name, code) in [("cs", "Computer Science", "CS"), ("math", "Mathematics", "MATH")] {
        directory
            .put_department(&Department {
                id: id.into(),
                name: name.into(),
                code: Some(code.into()),
            })
            .await?;
    }

    let people = [
        ("org1", "Olivia Organizer", Role::Organizer),
        ("student1", "Sam Student", Role::Student),
        ("student2", "Alex Learner", Role::Student),
        ("student3", "Jordan Scholar", Role::Student),
    ];
    for (id, name, role) in people {
        let user = User {
            id: id.into(),
            display_name: name.into(),
            email: format!("{id}@campus.example"),
            role,
        };
        users.put(id, &user).await?;
    }

    let events = [
        ("careerfair", "Career Fair", "Student Union", 24, "academic", "cs"),
        ("jazznight", "Jazz Night", "Concert Hall", 72, "music", "math"),
        ("hackathon", "Spring Hackathon", "Engineering Building", 168, "academic", "cs"),
    ];
    for (id, title, venue, hours, category, department) in events {
        let starts_at = now + Duration::hours(hours);
        directory
            .create(&Event {
                id: id.into(),
                title: title.into(),
                description: format!("{title} for all students"),
                location: Location::named(venue),
                starts_at,
                ends_at: starts_at + Duration::hours(3),
                organizer_id: "org1".into(),
                category_id: Some(category.into()),
                department_id: Some(department.into()),
                capacity: Some(200),
                created_at: now,
            })
            .await?;
    }

    let invitations = [
        ("careerfair", "student1", RsvpStatus::Going),
        ("careerfair", "student2", RsvpStatus::Maybe),
        ("jazznight", "student1", RsvpStatus::Going),
        ("hackathon", "student3", RsvpStatus::NotGoing),
    ];
    for (event, user, status) in invitations {
        rsvps
            .set_status(&EventId::new(event), &UserId::new(user), status)
            .await?;
    }

    let summary = SeedSummary {
        users: people.len(),
        events: events.len(),
        rsvps: invitations.len(),
    };
    tracing::info!(?summary, "Seeded demo data");
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campus_events_testing::{InMemoryDocumentStore, test_clock};

    #[tokio::test]
    async fn seeding_twice_keeps_one_copy() {
        let store = InMemoryDocumentStore::new();
        let documents: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let clock: Arc<dyn Clock> = Arc::new(test_clock());

        let first = seed(Arc::clone(&documents), Arc::clone(&clock)).await.unwrap();
        let second = seed(documents, clock).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(collections::EVENTS), 3);
        assert_eq!(store.len(collections::RSVPS), 4);
        assert_eq!(store.len(collections::USERS), 4);
        assert!(store.document(collections::RSVPS, "careerfair_student1").is_some());
    }
}
