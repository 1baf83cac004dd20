//! Coordinate backfill against an external geocoding service.
//!
//! The service is rate limited by its usage policy, so every lookup goes
//! through [`RateLimitedGeocoder`]: one request at a time, a fixed minimum
//! delay between requests, and a bounded cache keyed by normalized address.
//! Lookup failures only cost the event its coordinates.

use crate::error::{IngestError, Result};
use crate::types::{Coordinates, NormalizedEvent};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service has no match for `address`.
    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>>;
}

/// Nominatim-style search endpoint (`/search?q=...&format=json`).
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::adapter(
                "geocoder",
                format!("geocoder responded with status {}", status.as_u16()),
            ));
        }
        let places: Vec<Place> = resp.json().await?;
        Ok(places.first().and_then(|p| {
            Some(Coordinates {
                lat: p.lat.parse().ok()?,
                lng: p.lon.parse().ok()?,
            })
        }))
    }
}

/// Lowercased, whitespace-collapsed cache key.
pub fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Insertion-ordered cache; the oldest entry goes first when full.
struct BoundedCache {
    capacity: usize,
    entries: HashMap<String, Option<Coordinates>>,
    order: VecDeque<String>,
}

impl BoundedCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<Option<Coordinates>> {
        self.entries.get(key).copied()
    }

    fn put(&mut self, key: String, value: Option<Coordinates>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Throttled, cached front for a [`Geocoder`]. Shared by reference; holds no
/// process-wide state of its own.
pub struct RateLimitedGeocoder {
    inner: Arc<dyn Geocoder>,
    min_delay: Duration,
    // Held across the request so lookups are strictly sequential
    last_request: Mutex<Option<Instant>>,
    cache: Mutex<BoundedCache>,
}

impl RateLimitedGeocoder {
    pub fn new(inner: Arc<dyn Geocoder>, min_delay: Duration, cache_capacity: usize) -> Self {
        Self {
            inner,
            min_delay,
            last_request: Mutex::new(None),
            cache: Mutex::new(BoundedCache::new(cache_capacity)),
        }
    }

    /// Coordinates for `address`, or `None` on no match or failure.
    pub async fn coordinates_for(&self, address: &str) -> Option<Coordinates> {
        let key = normalize_address(address);
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(address = %key, "Geocode cache hit");
            return hit;
        }

        let mut last = self.last_request.lock().await;
        // Another caller may have filled the entry while we waited
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return hit;
        }
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        let result = self.inner.lookup(&key).await;
        *last = Some(Instant::now());
        drop(last);

        match result {
            Ok(coordinates) => {
                self.cache.lock().await.put(key, coordinates);
                coordinates
            }
            Err(e) => {
                // Not cached: a transient failure should not stick
                warn!(address = %key, "Geocode lookup failed: {}", e);
                None
            }
        }
    }
}

/// Fills in venue coordinates for events that have an address and none yet.
/// Returns how many events gained coordinates.
pub async fn backfill_coordinates(events: &mut [NormalizedEvent], geocoder: &RateLimitedGeocoder) -> usize {
    let mut filled = 0;
    for event in events.iter_mut() {
        if event.venue.coordinates.is_some() {
            continue;
        }
        let query = match &event.venue.address {
            Some(address) => format!("{}, {}", address, event.venue.city),
            None => continue,
        };
        if let Some(coordinates) = geocoder.coordinates_for(&query).await {
            event.venue.coordinates = Some(coordinates);
            filled += 1;
        }
    }
    if filled > 0 {
        info!("📍 Backfilled coordinates for {} events", filled);
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{City, Venue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn lookup(&self, address: &str) -> Result<Option<Coordinates>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.contains("nowhere") {
                return Ok(None);
            }
            if address.contains("flaky") {
                return Err(IngestError::adapter("geocoder", "503"));
            }
            Ok(Some(Coordinates { lat: 49.28, lng: -123.12 }))
        }
    }

    fn geocoder(min_delay: Duration, capacity: usize) -> (Arc<CountingGeocoder>, RateLimitedGeocoder) {
        let inner = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
        });
        let limited = RateLimitedGeocoder::new(inner.clone(), min_delay, capacity);
        (inner, limited)
    }

    #[tokio::test]
    async fn test_cache_keyed_by_normalized_address() {
        let (inner, geo) = geocoder(Duration::ZERO, 10);
        assert!(geo.coordinates_for("868 Granville St, Vancouver").await.is_some());
        assert!(geo.coordinates_for("  868 granville st,   VANCOUVER ").await.is_some());
        assert!(geo.coordinates_for("nowhere lane").await.is_none());
        assert!(geo.coordinates_for("Nowhere Lane").await.is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (inner, geo) = geocoder(Duration::ZERO, 10);
        assert!(geo.coordinates_for("flaky road").await.is_none());
        assert!(geo.coordinates_for("flaky road").await.is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest_when_full() {
        let (inner, geo) = geocoder(Duration::ZERO, 2);
        geo.coordinates_for("a st").await;
        geo.coordinates_for("b st").await;
        geo.coordinates_for("c st").await;
        geo.coordinates_for("a st").await;
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
        geo.coordinates_for("c st").await;
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_minimum_delay_between_requests() {
        let (_, geo) = geocoder(Duration::from_millis(60), 10);
        let start = Instant::now();
        geo.coordinates_for("first ave").await;
        geo.coordinates_for("second ave").await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_backfill_only_touches_addressed_venues() {
        let (_, geo) = geocoder(Duration::ZERO, 10);
        let event = |name: &str, address: Option<&str>| NormalizedEvent {
            title: "Show".to_string(),
            date: None,
            venue: Venue {
                name: name.to_string(),
                address: address.map(str::to_string),
                city: City::Vancouver,
                coordinates: None,
            },
            url: None,
            description: None,
            image_url: None,
            category: None,
            source: "test".to_string(),
            dedupe_key: format!("show|{}|undated", name.to_lowercase()),
            click_count: 0,
        };
        let mut events = vec![
            event("Commodore Ballroom", Some("868 Granville St")),
            event("Somewhere", None),
        ];
        assert_eq!(backfill_coordinates(&mut events, &geo).await, 1);
        assert!(events[0].venue.coordinates.is_some());
        assert!(events[1].venue.coordinates.is_none());
    }
}
