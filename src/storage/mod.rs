pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryEventStore;
pub use sqlite::SqliteEventStore;

use crate::error::Result;
use crate::types::{City, NormalizedEvent, StoredEvent};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Namespace for event ids derived from dedupe keys.
pub const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a0e_93d4_4b57_9a3e_5c0f_7e21_d8b4);

/// Counts from one city replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub removed: usize,
    pub inserted: usize,
}

/// Storage for persisted events.
///
/// `replace_city` is the one write path the import uses. It swaps the scraped
/// records of a city for a new batch as a single unit: readers see either the
/// old set or the new set, and a failure leaves the old set in place.
/// Admin-curated records are never touched by it.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn events_for_city(&self, city: City) -> Result<Vec<StoredEvent>>;

    async fn replace_city(&self, city: City, batch: Vec<StoredEvent>) -> Result<CommitSummary>;

    /// Only records with an id are reachable here.
    async fn get_event_by_id(&self, id: &str) -> Result<Option<StoredEvent>>;

    async fn all_events(&self) -> Result<Vec<StoredEvent>>;
}

/// Store-facing record for a normalized event. The id is a UUIDv5 of the
/// dedupe key, so it survives a refresh that deletes and reinserts the event.
pub fn to_stored(event: &NormalizedEvent) -> StoredEvent {
    let location = match &event.venue.address {
        Some(address) => format!("{}, {}", event.venue.name, address),
        None => format!("{}, {}", event.venue.name, event.venue.city),
    };
    StoredEvent {
        id: Some(Uuid::new_v5(&EVENT_ID_NAMESPACE, event.dedupe_key.as_bytes()).to_string()),
        title: event.title.clone(),
        date: event.date.map(|d| d.to_iso_string()),
        venue: event.venue.clone(),
        location: Some(location),
        url: event.url.clone(),
        description: event.description.clone(),
        image_url: event.image_url.clone(),
        category: event.category.clone(),
        source: event.source.clone(),
        click_count: event.click_count,
    }
}

/// Id index over `events`; legacy records without an id are left out.
pub fn index_by_id(events: &[StoredEvent]) -> HashMap<&str, &StoredEvent> {
    events
        .iter()
        .filter_map(|e| e.id.as_deref().map(|id| (id, e)))
        .collect()
}
