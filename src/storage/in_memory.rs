use super::{CommitSummary, EventStore};
use crate::error::{IngestError, Result};
use crate::types::{City, StoredEvent};
use async_trait::async_trait;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// In-memory storage implementation for development/testing
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<StoredEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Direct insert, used for admin-curated and seeded records.
    pub fn insert(&self, event: StoredEvent) -> Result<()> {
        self.write()?.push(event);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<StoredEvent>>> {
        self.events.read().map_err(|_| IngestError::Database {
            message: "event store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<StoredEvent>>> {
        self.events.write().map_err(|_| IngestError::Database {
            message: "event store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn events_for_city(&self, city: City) -> Result<Vec<StoredEvent>> {
        Ok(self
            .read()?
            .iter()
            .filter(|e| e.city() == city)
            .cloned()
            .collect())
    }

    async fn replace_city(&self, city: City, batch: Vec<StoredEvent>) -> Result<CommitSummary> {
        // Build the replacement under the write lock so readers only ever
        // see the old or the new collection
        let mut events = self.write()?;
        let before = events.len();
        let mut next: Vec<StoredEvent> = events
            .iter()
            .filter(|e| e.city() != city || e.is_admin())
            .cloned()
            .collect();
        let removed = before - next.len();
        let inserted = batch.len();
        next.extend(batch);
        *events = next;

        debug!(city = %city, removed, inserted, "Replaced city events");
        Ok(CommitSummary { removed, inserted })
    }

    async fn get_event_by_id(&self, id: &str) -> Result<Option<StoredEvent>> {
        Ok(self
            .read()?
            .iter()
            .find(|e| e.id.as_deref() == Some(id))
            .cloned())
    }

    async fn all_events(&self) -> Result<Vec<StoredEvent>> {
        Ok(self.read()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ADMIN_SOURCE;
    use crate::types::Venue;

    fn stored(id: Option<&str>, title: &str, city: City, source: &str) -> StoredEvent {
        StoredEvent {
            id: id.map(str::to_string),
            title: title.to_string(),
            date: Some("2025-11-02".to_string()),
            venue: Venue {
                name: "Massey Hall".to_string(),
                address: None,
                city,
                coordinates: None,
            },
            location: None,
            url: None,
            description: None,
            image_url: None,
            category: None,
            source: source.to_string(),
            click_count: 0,
        }
    }

    #[tokio::test]
    async fn test_replace_city_scoped_and_keeps_admin() {
        let store = InMemoryEventStore::with_events(vec![
            stored(Some("1"), "Old Show", City::Toronto, "massey"),
            stored(Some("2"), "Staff Pick", City::Toronto, ADMIN_SOURCE),
            stored(Some("3"), "Elsewhere", City::Calgary, "jubilee"),
        ]);

        let summary = store
            .replace_city(City::Toronto, vec![stored(Some("4"), "New Show", City::Toronto, "massey")])
            .await
            .unwrap();
        assert_eq!(summary, CommitSummary { removed: 1, inserted: 1 });

        let toronto: Vec<String> = store
            .events_for_city(City::Toronto)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(toronto, vec!["Staff Pick", "New Show"]);
        assert_eq!(store.events_for_city(City::Calgary).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_records_not_reachable_by_id() {
        let store = InMemoryEventStore::new();
        store.insert(stored(None, "Legacy", City::Toronto, "massey")).unwrap();
        store.insert(stored(Some("abc"), "Current", City::Toronto, "massey")).unwrap();

        assert_eq!(store.get_event_by_id("abc").await.unwrap().unwrap().title, "Current");
        assert!(store.get_event_by_id("").await.unwrap().is_none());
        assert_eq!(store.all_events().await.unwrap().len(), 2);
    }
}
