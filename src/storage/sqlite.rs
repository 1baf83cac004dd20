use super::{CommitSummary, EventStore};
use crate::constants::ADMIN_SOURCE;
use crate::error::{IngestError, Result};
use crate::types::{City, StoredEvent};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// SQLite-backed event store.
///
/// Each row keeps the full event document as JSON next to the columns used
/// for filtering. A city replace first stages the new batch under a batch id,
/// then promotes it in one transaction.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;
        info!("📦 Opened event store at {}", db_path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                row_id    INTEGER PRIMARY KEY AUTOINCREMENT,
                id        TEXT,
                city      TEXT NOT NULL,
                source    TEXT NOT NULL,
                title     TEXT NOT NULL CHECK (length(trim(title)) > 0),
                date      TEXT,
                document  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_city ON events(city);
            CREATE INDEX IF NOT EXISTS idx_events_id ON events(id);
            CREATE TABLE IF NOT EXISTS events_staging (
                row_id    INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id  TEXT NOT NULL,
                id        TEXT,
                city      TEXT NOT NULL,
                source    TEXT NOT NULL,
                title     TEXT NOT NULL CHECK (length(trim(title)) > 0),
                date      TEXT,
                document  TEXT NOT NULL
            );
            DELETE FROM events_staging;
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Direct insert, used for admin-curated and seeded records.
    pub fn insert(&self, event: &StoredEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (id, city, source, title, date, document) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.city().name(),
                event.source,
                event.title,
                event.date,
                serde_json::to_string(event)?
            ],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| IngestError::Database {
            message: "event store connection lock poisoned".to_string(),
        })
    }

    fn query_documents(&self, sql: &str, param: Option<&str>) -> Result<Vec<StoredEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let documents: Vec<String> = match param {
            Some(p) => stmt
                .query_map(params![p], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<_, _>>()?,
            None => stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<_, _>>()?,
        };
        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(IngestError::from))
            .collect()
    }

    fn replace_city_blocking(&self, city: City, batch: &[StoredEvent]) -> Result<CommitSummary> {
        let batch_id = Uuid::new_v4().to_string();
        let mut conn = self.lock()?;

        // Stage: nothing visible changes if this fails
        {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO events_staging (batch_id, id, city, source, title, date, document)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for event in batch {
                    stmt.execute(params![
                        batch_id,
                        event.id,
                        city.name(),
                        event.source,
                        event.title,
                        event.date,
                        serde_json::to_string(event)?
                    ])?;
                }
            }
            tx.commit()?;
        }

        // Swap
        let swapped = (|| -> Result<CommitSummary> {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM events WHERE city = ?1 AND source != ?2",
                params![city.name(), ADMIN_SOURCE],
            )?;
            let inserted = tx.execute(
                "INSERT INTO events (id, city, source, title, date, document)
                 SELECT id, city, source, title, date, document FROM events_staging
                 WHERE batch_id = ?1 ORDER BY row_id",
                params![batch_id],
            )?;
            tx.execute("DELETE FROM events_staging WHERE batch_id = ?1", params![batch_id])?;
            tx.commit()?;
            Ok(CommitSummary { removed, inserted })
        })();

        if swapped.is_err() {
            if let Err(e) = conn.execute("DELETE FROM events_staging WHERE batch_id = ?1", params![batch_id]) {
                warn!(batch_id = %batch_id, "Failed to clear staged batch: {}", e);
            }
        }
        swapped
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn events_for_city(&self, city: City) -> Result<Vec<StoredEvent>> {
        self.query_documents(
            "SELECT document FROM events WHERE city = ?1 ORDER BY row_id",
            Some(city.name()),
        )
    }

    async fn replace_city(&self, city: City, batch: Vec<StoredEvent>) -> Result<CommitSummary> {
        let summary = self.replace_city_blocking(city, &batch).map_err(|e| {
            warn!(city = %city, "City replace rolled back: {}", e);
            e
        })?;
        debug!(city = %city, removed = summary.removed, inserted = summary.inserted, "Replaced city events");
        Ok(summary)
    }

    async fn get_event_by_id(&self, id: &str) -> Result<Option<StoredEvent>> {
        Ok(self
            .query_documents(
                "SELECT document FROM events WHERE id = ?1 ORDER BY row_id LIMIT 1",
                Some(id),
            )?
            .into_iter()
            .next())
    }

    async fn all_events(&self) -> Result<Vec<StoredEvent>> {
        self.query_documents("SELECT document FROM events ORDER BY row_id", None)
    }
}
