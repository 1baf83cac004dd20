use super::{parse_candidates, AdapterObject, Scrape};
use crate::error::{IngestError, Result};
use crate::types::{City, RawCandidate};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Reads candidates that an out-of-process scraper dumped to a JSON file.
pub struct JsonFileAdapter {
    id: String,
    path: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Scrape for JsonFileAdapter {
    #[instrument(skip(self), fields(adapter = %self.id))]
    async fn scrape(&self, _city: City) -> Result<Vec<RawCandidate>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            IngestError::adapter(&self.id, format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let payload: serde_json::Value = serde_json::from_str(&content)?;
        let candidates = parse_candidates(payload, &self.id)?;
        info!("Read {} candidates from {}", candidates.len(), self.path.display());
        Ok(candidates)
    }
}

impl AdapterObject for JsonFileAdapter {
    fn as_scrape(&self) -> Option<&dyn Scrape> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_candidates_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rom.json");
        std::fs::write(
            &path,
            json!([{"title": "After Dark", "dateText": "Jul 25"}]).to_string(),
        )
        .unwrap();

        let adapter = JsonFileAdapter::new("rom", &path);
        let candidates = adapter.scrape(City::Toronto).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].date_text.as_deref(), Some("Jul 25"));
    }

    #[tokio::test]
    async fn test_missing_file_is_adapter_error() {
        let adapter = JsonFileAdapter::new("ghost", "/nonexistent/ghost.json");
        let err = adapter.scrape(City::Toronto).await.unwrap_err();
        assert!(matches!(err, IngestError::Adapter { .. }));
    }
}
