use anyhow::Result;
use chrono::NaiveDate;
use event_ingest::adapters::registry::AdapterRegistry;
use event_ingest::storage::{EventStore, SqliteEventStore};
use event_ingest::{City, ImportOrchestrator};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_json_registry_import_into_sqlite() -> Result<()> {
    let temp_dir = tempdir()?;
    let registry_dir = temp_dir.path().join("sources");
    std::fs::create_dir_all(registry_dir.join("feeds"))?;

    std::fs::write(
        registry_dir.join("rom.json"),
        json!({
            "source_id": "rom",
            "city": "Toronto",
            "kind": "json_file",
            "path": "feeds/rom_events.json",
            "default_venue": {
                "name": "Royal Ontario Museum",
                "address": "100 Queens Park"
            }
        })
        .to_string(),
    )?;
    std::fs::write(
        registry_dir.join("feeds").join("rom_events.json"),
        json!({
            "events": [
                {"title": "Friday Night Live", "dateText": "July 25th, 2025 7:00 pm"},
                {"title": "Search", "dateText": "July 25th, 2025"},
                {"title": "Dinosaur Gallery Tour", "dateText": "Check website"},
                {"title": "Rialto Late Show", "dateText": "Jul 26, 2025", "venue": {"name": "Rialto Theatre", "city": "Montreal"}}
            ]
        })
        .to_string(),
    )?;
    // Not a source config: wrong extension
    std::fs::write(registry_dir.join("README.md"), "notes")?;

    let db_path = temp_dir.path().join("data").join("events.db");
    let store = Arc::new(SqliteEventStore::open(&db_path)?);
    let registry = AdapterRegistry::load_from_directory(&registry_dir, reqwest::Client::new())?;
    assert_eq!(registry.len(), 1);

    let orchestrator = ImportOrchestrator::new(registry, store.clone())
        .with_today(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
    let first = orchestrator.import_city(City::Toronto).await?;
    assert_eq!(first.imported, 2);
    assert_eq!(first.rejected_total(), 1);
    // A venue in another city is not filed under this one
    assert_eq!(first.unresolved_venues, 1);

    let events = store.events_for_city(City::Toronto).await?;
    let late = &events[0];
    assert_eq!(late.title, "Friday Night Live");
    assert_eq!(late.date.as_deref(), Some("2025-07-25T19:00:00"));
    assert_eq!(late.location.as_deref(), Some("Royal Ontario Museum, 100 Queens Park"));
    let tour = &events[1];
    assert!(tour.date.is_none());
    assert_eq!(tour.category.as_deref(), Some("Art & Exhibitions"));

    // Ids survive a second full refresh
    let id = late.id.clone().unwrap();
    let second = orchestrator.import_city(City::Toronto).await?;
    assert_eq!(second.imported, 2);
    let again = store.get_event_by_id(&id).await?.expect("event still reachable by id");
    assert_eq!(again.title, "Friday Night Live");
    assert_eq!(store.all_events().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_sqlite_store_persists_across_reopen() -> Result<()> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join("events.db");

    let registry_dir = temp_dir.path().join("sources");
    std::fs::create_dir_all(registry_dir.join("feeds"))?;
    std::fs::write(
        registry_dir.join("commodore.json"),
        json!({
            "source_id": "commodore",
            "city": "vancouver",
            "kind": "json_file",
            "path": "feeds/commodore.json",
            "default_venue": {"name": "Commodore Ballroom", "address": "868 Granville St"}
        })
        .to_string(),
    )?;
    std::fs::write(
        registry_dir.join("feeds").join("commodore.json"),
        json!([{"title": "Khruangbin", "date": "2025-09-12"}]).to_string(),
    )?;

    {
        let store = Arc::new(SqliteEventStore::open(&db_path)?);
        let registry = AdapterRegistry::load_from_directory(&registry_dir, reqwest::Client::new())?;
        ImportOrchestrator::new(registry, store)
            .with_today(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap())
            .import_city(City::Vancouver)
            .await?;
    }

    let reopened = SqliteEventStore::open(&db_path)?;
    let events = reopened.events_for_city(City::Vancouver).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].venue.name, "Commodore Ballroom");
    assert_eq!(events[0].source, "commodore");
    Ok(())
}
