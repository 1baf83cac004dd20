use super::{parse_candidates, AdapterObject, ScrapeEvents};
use crate::error::{IngestError, Result};
use crate::types::{City, RawCandidate};
use async_trait::async_trait;
use tracing::{info, instrument};

const USER_AGENT: &str = concat!("event_ingest/", env!("CARGO_PKG_VERSION"));

/// Pulls candidates from an aggregator endpoint that already serves JSON.
pub struct JsonFeedAdapter {
    id: String,
    url: String,
    client: reqwest::Client,
}

impl JsonFeedAdapter {
    pub fn new(id: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ScrapeEvents for JsonFeedAdapter {
    #[instrument(skip(self), fields(adapter = %self.id))]
    async fn scrape_events(&self, city: City) -> Result<Vec<RawCandidate>> {
        info!("HTTP GET request to: {}", self.url);
        let resp = self
            .client
            .get(&self.url)
            .query(&[("city", city.name())])
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::adapter(
                &self.id,
                format!("feed responded with status {}", status.as_u16()),
            ));
        }
        let payload: serde_json::Value = resp.json().await?;
        let candidates = parse_candidates(payload, &self.id)?;
        info!("Fetched {} candidates from feed", candidates.len());
        Ok(candidates)
    }
}

impl AdapterObject for JsonFeedAdapter {
    fn as_scrape_events(&self) -> Option<&dyn ScrapeEvents> {
        Some(self)
    }
}
