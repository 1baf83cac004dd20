//! Source adapters: the external producers of raw candidates.
//!
//! Adapters come in three shapes (a plain function, an object exposing
//! `scrape`, an object exposing `scrape_events`). The shape is probed once when
//! the adapter is loaded and kept as a tagged [`AdapterKind`]; there is no
//! shared base type adapters must inherit from.

pub mod json_feed;
pub mod json_file;
pub mod registry;

use crate::error::{IngestError, Result};
use crate::pipeline::venue::DefaultVenue;
use crate::types::{City, RawCandidate};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub type AdapterFuture = Pin<Box<dyn Future<Output = Result<Vec<RawCandidate>>> + Send>>;

/// Function-shaped adapters, synchronous or asynchronous.
#[derive(Clone)]
pub enum Callable {
    Sync(Arc<dyn Fn(City) -> Result<Vec<RawCandidate>> + Send + Sync>),
    Async(Arc<dyn Fn(City) -> AdapterFuture + Send + Sync>),
}

#[async_trait]
pub trait Scrape: Send + Sync {
    async fn scrape(&self, city: City) -> Result<Vec<RawCandidate>>;
}

#[async_trait]
pub trait ScrapeEvents: Send + Sync {
    async fn scrape_events(&self, city: City) -> Result<Vec<RawCandidate>>;
}

/// Capabilities an object-shaped adapter may expose. Both default to absent;
/// an object exposing neither is malformed.
pub trait AdapterObject: Send + Sync {
    fn as_scrape(&self) -> Option<&dyn Scrape> {
        None
    }

    fn as_scrape_events(&self) -> Option<&dyn ScrapeEvents> {
        None
    }
}

/// What an adapter module hands over before probing.
#[derive(Clone)]
pub enum AdapterExport {
    Function(Callable),
    Object(Arc<dyn AdapterObject>),
}

impl AdapterExport {
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(City) -> Result<Vec<RawCandidate>> + Send + Sync + 'static,
    {
        AdapterExport::Function(Callable::Sync(Arc::new(f)))
    }

    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(City) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<RawCandidate>>> + Send + 'static,
    {
        AdapterExport::Function(Callable::Async(Arc::new(move |city: City| -> AdapterFuture {
            Box::pin(f(city))
        })))
    }

    pub fn object<T: AdapterObject + 'static>(object: T) -> Self {
        AdapterExport::Object(Arc::new(object))
    }
}

/// Probed adapter shape.
#[derive(Clone)]
pub enum AdapterKind {
    Callable(Callable),
    ScrapeMethod(Arc<dyn AdapterObject>),
    ScrapeEventsMethod(Arc<dyn AdapterObject>),
}

impl AdapterKind {
    /// Direct invocation first, then `scrape`, then `scrape_events`.
    pub fn probe(export: AdapterExport) -> std::result::Result<Self, AdapterFailure> {
        match export {
            AdapterExport::Function(callable) => Ok(AdapterKind::Callable(callable)),
            AdapterExport::Object(object) => {
                if object.as_scrape().is_some() {
                    Ok(AdapterKind::ScrapeMethod(object))
                } else if object.as_scrape_events().is_some() {
                    Ok(AdapterKind::ScrapeEventsMethod(object))
                } else {
                    Err(AdapterFailure::MalformedShape(
                        "object exposes neither scrape nor scrape_events".to_string(),
                    ))
                }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdapterKind::Callable(Callable::Sync(_)) => "function",
            AdapterKind::Callable(Callable::Async(_)) => "async function",
            AdapterKind::ScrapeMethod(_) => "object with scrape",
            AdapterKind::ScrapeEventsMethod(_) => "object with scrape_events",
        }
    }
}

/// Why an adapter contributed nothing to this run. Never fatal to the import.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterFailure {
    Timeout { after: Duration },
    Errored(String),
    MalformedShape(String),
    Panicked(String),
}

impl fmt::Display for AdapterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterFailure::Timeout { after } => write!(f, "timed out after {:?}", after),
            AdapterFailure::Errored(msg) => write!(f, "errored: {}", msg),
            AdapterFailure::MalformedShape(msg) => write!(f, "malformed adapter: {}", msg),
            AdapterFailure::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

/// A loaded adapter scoped to one city.
#[derive(Clone)]
pub struct SourceAdapter {
    id: String,
    city: City,
    default_venue: Option<DefaultVenue>,
    kind: AdapterKind,
}

impl fmt::Debug for SourceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAdapter")
            .field("id", &self.id)
            .field("city", &self.city)
            .field("kind", &self.kind.label())
            .finish()
    }
}

impl SourceAdapter {
    /// Probes `export` and binds it to `id` and `city`.
    pub fn load(
        id: impl Into<String>,
        city: City,
        export: AdapterExport,
    ) -> std::result::Result<Self, AdapterFailure> {
        let id = id.into();
        let kind = AdapterKind::probe(export)?;
        debug!(adapter = %id, shape = kind.label(), "Loaded adapter");
        Ok(Self {
            id,
            city,
            default_venue: None,
            kind,
        })
    }

    pub fn with_default_venue(mut self, venue: Option<DefaultVenue>) -> Self {
        self.default_venue = venue;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn city(&self) -> City {
        self.city
    }

    pub fn default_venue(&self) -> Option<&DefaultVenue> {
        self.default_venue.as_ref()
    }

    pub fn kind(&self) -> &AdapterKind {
        &self.kind
    }

    /// Runs the adapter once for its city.
    pub async fn fetch(&self) -> Result<Vec<RawCandidate>> {
        match &self.kind {
            AdapterKind::Callable(Callable::Sync(f)) => {
                let f = Arc::clone(f);
                let city = self.city;
                tokio::task::spawn_blocking(move || f(city))
                    .await
                    .map_err(|e| IngestError::adapter(&self.id, e.to_string()))?
            }
            AdapterKind::Callable(Callable::Async(f)) => f(self.city).await,
            AdapterKind::ScrapeMethod(object) => match object.as_scrape() {
                Some(s) => s.scrape(self.city).await,
                None => Err(IngestError::adapter(&self.id, "scrape method disappeared")),
            },
            AdapterKind::ScrapeEventsMethod(object) => match object.as_scrape_events() {
                Some(s) => s.scrape_events(self.city).await,
                None => Err(IngestError::adapter(&self.id, "scrape_events method disappeared")),
            },
        }
    }
}

/// Converts a producer's JSON payload into candidates, one element at a time.
/// Any object becomes a candidate (validation judges it later); other values
/// are dropped. Accepts a bare array or an object with an `events` array.
pub fn parse_candidates(payload: serde_json::Value, adapter_id: &str) -> Result<Vec<RawCandidate>> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("events") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(IngestError::adapter(
                    adapter_id,
                    "payload object has no `events` array",
                ))
            }
        },
        _ => return Err(IngestError::adapter(adapter_id, "payload is not a list of events")),
    };

    let total = items.len();
    let candidates: Vec<RawCandidate> = items
        .iter()
        .filter_map(|item| item.as_object().map(RawCandidate::from_json_map))
        .collect();
    if candidates.len() < total {
        warn!(
            adapter = adapter_id,
            malformed = total - candidates.len(),
            "Dropped candidate records that are not JSON objects"
        );
    }
    Ok(candidates)
}
