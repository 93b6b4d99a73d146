//! Event directory: events, categories and departments.

use crate::error::Result;
use crate::repository::Collection;
use crate::types::{Category, Department, Event, EventId, collections};
use campus_events_core::document_store::{Direction, DocumentStore, Query};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Reads and writes the event catalogue.
#[derive(Clone)]
pub struct EventDirectory {
    events: Collection<Event>,
    categories: Collection<Category>,
    departments: Collection<Department>,
}

impl EventDirectory {
    /// Create a directory over `documents`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            events: Collection::new(Arc::clone(&documents), collections::EVENTS),
            categories: Collection::new(Arc::clone(&documents), collections::CATEGORIES),
            departments: Collection::new(documents, collections::DEPARTMENTS),
        }
    }

    /// Look up one event.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn get(&self, event_id: &EventId) -> Result<Option<Event>> {
        Ok(self.events.get(event_id.as_str()).await?)
    }

    /// Store an event under its id, replacing any previous version.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn create(&self, event: &Event) -> Result<()> {
        self.events.put(event.id.as_str(), event).await?;
        tracing::info!(title = %event.title, "Event saved");
        Ok(())
    }

    /// Events starting at or after `now`, soonest first.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let events = self.fetch_by_start(self.events.query()).await?;
        Ok(events.into_iter().filter(|e| e.starts_at >= now).collect())
    }

    /// Events in a category, soonest first.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn by_category(&self, category_id: &str) -> Result<Vec<Event>> {
        self.fetch_by_start(self.events.query().where_eq("categoryId", category_id))
            .await
    }

    /// Events hosted by a department, soonest first.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn by_department(&self, department_id: &str) -> Result<Vec<Event>> {
        self.fetch_by_start(self.events.query().where_eq("departmentId", department_id))
            .await
    }

    async fn fetch_by_start(&self, query: Query) -> Result<Vec<Event>> {
        Ok(self
            .events
            .fetch(query.order_by("startsAt", Direction::Ascending))
            .await?)
    }

    /// Every category, by id.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.categories.fetch(self.categories.query()).await?)
    }

    /// Every department, by id.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn departments(&self) -> Result<Vec<Department>> {
        Ok(self.departments.fetch(self.departments.query()).await?)
    }

    /// Store a category.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn put_category(&self, category: &Category) -> Result<()> {
        Ok(self.categories.put(&category.id, category).await?)
    }

    /// Store a department.
    ///
    /// # Errors
    ///
    /// [`crate::CheckInError::Storage`] if the store fails.
    pub async fn put_department(&self, department: &Department) -> Result<()> {
        Ok(self.departments.put(&department.id, department).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Location;
    use campus_events_testing::InMemoryDocumentStore;
    use chrono::Duration;

    fn event(id: &str, starts_in_hours: i64, category: Option<&str>) -> Event {
        let base = DateTime::from_timestamp(1_735_689_600, 0).unwrap();
        Event {
            id: id.into(),
            title: format!("Event {id}"),
            description: String::new(),
            location: Location::named("Main Hall"),
            starts_at: base + Duration::hours(starts_in_hours),
            ends_at: base + Duration::hours(starts_in_hours + 2),
            organizer_id: "org1".into(),
            category_id: category.map(str::to_string),
            department_id: None,
            capacity: Some(100),
            created_at: base,
        }
    }

    #[tokio::test]
    async fn upcoming_excludes_past_and_sorts_by_start() {
        let directory = EventDirectory::new(Arc::new(InMemoryDocumentStore::new()));
        for e in [event("late", 48, None), event("past", -5, None), event("soon", 2, None)] {
            directory.create(&e).await.unwrap();
        }

        let now = DateTime::from_timestamp(1_735_689_600, 0).unwrap();
        let ids: Vec<String> = directory
            .upcoming(now)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["soon", "late"]);
    }

    #[tokio::test]
    async fn filters_by_category() {
        let directory = EventDirectory::new(Arc::new(InMemoryDocumentStore::new()));
        directory.create(&event("a", 1, Some("music"))).await.unwrap();
        directory.create(&event("b", 2, Some("sports"))).await.unwrap();

        let music = directory.by_category("music").await.unwrap();
        assert_eq!(music.len(), 1);
        assert_eq!(music[0].id.as_str(), "a");
        assert!(directory.get(&"b".into()).await.unwrap().is_some());
        assert!(directory.get(&"zzz".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stores_categories_and_departments() {
        let directory = EventDirectory::new(Arc::new(InMemoryDocumentStore::new()));
        directory
            .put_category(&Category { id: "music".into(), name: "Music".into() })
            .await
            .unwrap();
        directory
            .put_department(&Department {
                id: "cs".into(),
                name: "Computer Science".into(),
                code: Some("CS".into()),
            })
            .await
            .unwrap();

        assert_eq!(directory.categories().await.unwrap().len(), 1);
        assert_eq!(directory.departments().await.unwrap()[0].code.as_deref(), Some("CS"));
    }
}
