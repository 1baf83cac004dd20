use crate::adapters::registry::{AdapterRegistry, RegistryEntry};
use crate::adapters::{AdapterFailure, SourceAdapter};
use crate::config::ImportConfig;
use crate::error::{IngestError, Result};
use crate::geocode::{backfill_coordinates, RateLimitedGeocoder};
use crate::metrics::{
    ADAPTER_DURATION_SECONDS, ADAPTER_FAILURES_TOTAL, CANDIDATES_TOTAL, COMMIT_FAILURES_TOTAL,
    DEDUPED_TOTAL, IMPORTED_TOTAL, IMPORT_DURATION_SECONDS, REJECTED_TOTAL, UNDATED_TOTAL,
    UNRESOLVED_VENUES_TOTAL,
};
use crate::monitoring::{AdapterAlert, AdapterHealthMonitor};
use crate::pipeline::category::resolve_category;
use crate::pipeline::dates::DateNormalizer;
use crate::pipeline::dedup::{dedupe, dedupe_key};
use crate::pipeline::engagement::{restore, snapshot};
use crate::pipeline::validator::validate;
use crate::pipeline::venue::VenueTagger;
use crate::storage::{to_stored, EventStore};
use crate::types::{City, EventDate, NormalizedEvent, RawCandidate};
use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Where a city import currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportPhase {
    Idle,
    Fetching(usize),
    Validating,
    Normalizing,
    Tagging,
    Deduping,
    Merging,
    Committing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub adapter_timeout: Duration,
    pub max_concurrent_adapters: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            adapter_timeout: config.adapter_timeout(),
            max_concurrent_adapters: config.max_concurrent_adapters.max(1),
        }
    }
}

/// Outcome of one city import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub city: City,
    /// Records written by the commit; 0 when nothing was committed.
    pub imported: usize,
    /// Records collapsed into another record with the same dedupe key.
    pub deduped: usize,
    pub failed_adapters: Vec<String>,
    pub failure_reasons: BTreeMap<String, String>,
    pub candidates: usize,
    pub rejected: BTreeMap<&'static str, usize>,
    pub unresolved_venues: usize,
    pub undated: usize,
    pub restored_engagement: usize,
    pub geocoded: usize,
    pub committed: bool,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_commit: Option<String>,
    pub alerts: Vec<AdapterAlert>,
    pub duration_ms: u64,
}

impl ImportReport {
    fn new(city: City) -> Self {
        Self {
            city,
            imported: 0,
            deduped: 0,
            failed_adapters: Vec::new(),
            failure_reasons: BTreeMap::new(),
            candidates: 0,
            rejected: BTreeMap::new(),
            unresolved_venues: 0,
            undated: 0,
            restored_engagement: 0,
            geocoded: 0,
            committed: false,
            cancelled: false,
            skipped_commit: None,
            alerts: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Candidates from one adapter, with the context needed to tag them.
struct AdapterBatch {
    adapter_id: String,
    tagger: VenueTagger,
    candidates: Vec<RawCandidate>,
}

/// Drives the adapters of a city through the pipeline and commits the result.
///
/// One import runs at a time per orchestrator. Cancellation is honoured
/// between adapters; a cancelled run commits nothing.
pub struct ImportOrchestrator {
    registry: AdapterRegistry,
    store: Arc<dyn EventStore>,
    geocoder: Option<Arc<RateLimitedGeocoder>>,
    monitor: Arc<AdapterHealthMonitor>,
    options: ImportOptions,
    today: Option<NaiveDate>,
    cancel: Arc<AtomicBool>,
    phase: Mutex<ImportPhase>,
    run_lock: tokio::sync::Mutex<()>,
}

impl ImportOrchestrator {
    pub fn new(registry: AdapterRegistry, store: Arc<dyn EventStore>) -> Self {
        Self {
            registry,
            store,
            geocoder: None,
            monitor: Arc::new(AdapterHealthMonitor::default()),
            options: ImportOptions::default(),
            today: None,
            cancel: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(ImportPhase::Idle),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_geocoder(mut self, geocoder: Arc<RateLimitedGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<AdapterHealthMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Pins the reference day used to place year-less dates.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Flag that, once set, stops the current and future runs before their
    /// next adapter starts.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> ImportPhase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn monitor(&self) -> &AdapterHealthMonitor {
        &self.monitor
    }

    fn enter(&self, city: City, phase: ImportPhase) {
        debug!(city = %city, phase = ?phase, "Import phase");
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
    }

    /// Imports every supported city in turn. Stops early once cancelled.
    pub async fn import_all(&self) -> Vec<(City, Result<ImportReport>)> {
        let mut results = Vec::with_capacity(City::ALL.len());
        for city in City::ALL {
            if self.is_cancelled() {
                warn!("Import cancelled; skipping remaining cities");
                break;
            }
            results.push((city, self.import_city(city).await));
        }
        results
    }

    /// Runs one full refresh for `city`.
    ///
    /// Adapter failures are reported, never returned as errors. The only error
    /// is a store failure, in which case the city's previous data is intact.
    #[instrument(skip_all, fields(city = %city))]
    pub async fn import_city(&self, city: City) -> Result<ImportReport> {
        let _run = self.run_lock.lock().await;
        let started = Instant::now();
        let mut report = ImportReport::new(city);
        info!("🚀 Starting import for {}", city);

        let result = self.run(city, &mut report).await;
        self.enter(city, ImportPhase::Idle);

        report.duration_ms = started.elapsed().as_millis() as u64;
        histogram!(IMPORT_DURATION_SECONDS, "city" => city.name()).record(started.elapsed().as_secs_f64());
        match result {
            Ok(()) => {
                info!(
                    "✅ Import for {} finished: {} imported, {} deduped, {} failed adapters",
                    city,
                    report.imported,
                    report.deduped,
                    report.failed_adapters.len()
                );
                Ok(report)
            }
            Err(e) => {
                error!("❌ Import for {} failed: {}", city, e);
                counter!(COMMIT_FAILURES_TOTAL, "city" => city.name()).increment(1);
                Err(e)
            }
        }
    }

    async fn run(&self, city: City, report: &mut ImportReport) -> Result<()> {
        let entries = self.registry.for_city(city);
        let total_adapters = entries.len();
        let batches = self.fetch_all(city, entries, report).await;

        if report.cancelled {
            warn!("🛑 Import for {} cancelled; nothing committed", city);
            return Ok(());
        }
        if batches.is_empty() {
            let reason = if total_adapters == 0 {
                "no adapters registered".to_string()
            } else {
                format!("all {} adapters failed", total_adapters)
            };
            warn!("Skipping commit for {}: {}; previous data kept", city, reason);
            report.skipped_commit = Some(reason);
            return Ok(());
        }

        let events = self.process(city, batches, report);

        self.enter(city, ImportPhase::Deduping);
        let outcome = dedupe(events);
        report.deduped = outcome.removed;
        counter!(DEDUPED_TOTAL, "city" => city.name()).increment(outcome.removed as u64);
        let mut events = outcome.events;

        self.enter(city, ImportPhase::Merging);
        if let Some(geocoder) = &self.geocoder {
            report.geocoded = backfill_coordinates(&mut events, geocoder).await;
        }
        report.undated = events.iter().filter(|e| e.is_undated()).count();
        counter!(UNDATED_TOTAL, "city" => city.name()).increment(report.undated as u64);

        // Nothing slow may run between the snapshot and the replace
        let prior = self
            .store
            .events_for_city(city)
            .await
            .map_err(|e| commit_error(city, e))?;
        let summary = restore(&mut events, &snapshot(&prior, city));
        report.restored_engagement = summary.restored;

        self.enter(city, ImportPhase::Committing);
        let batch = events.iter().map(to_stored).collect();
        let commit = self
            .store
            .replace_city(city, batch)
            .await
            .map_err(|e| commit_error(city, e))?;
        report.imported = commit.inserted;
        report.committed = true;
        counter!(IMPORTED_TOTAL, "city" => city.name()).increment(commit.inserted as u64);
        info!(
            "💾 Committed {} events for {} (replaced {})",
            commit.inserted, city, commit.removed
        );
        Ok(())
    }

    /// Runs the city's adapters, at most `max_concurrent_adapters` at a time.
    /// Batches come back in registration order regardless of finish order.
    async fn fetch_all(
        &self,
        city: City,
        entries: Vec<RegistryEntry>,
        report: &mut ImportReport,
    ) -> Vec<AdapterBatch> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_adapters));
        let timeout = self.options.adapter_timeout;
        let mut join_set = JoinSet::new();
        let mut outcomes: Vec<(usize, SourceAdapterRun)> = Vec::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.enter(city, ImportPhase::Fetching(index));
            match entry {
                RegistryEntry::Broken { id, failure, .. } => {
                    outcomes.push((
                        index,
                        SourceAdapterRun {
                            id,
                            adapter: None,
                            elapsed: Duration::ZERO,
                            result: Err(failure),
                        },
                    ));
                }
                RegistryEntry::Ready(adapter) => {
                    join_set.spawn(async move {
                        let _permit = permit;
                        let started = Instant::now();
                        let result = run_adapter(&adapter, timeout).await;
                        (
                            index,
                            SourceAdapterRun {
                                id: adapter.id().to_string(),
                                elapsed: started.elapsed(),
                                adapter: Some(adapter),
                                result,
                            },
                        )
                    });
                }
            }
        }

        // Adapters already started finish even when cancelled
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Adapter task could not be joined: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let mut batches = Vec::new();
        for (_, run) in outcomes {
            histogram!(ADAPTER_DURATION_SECONDS, "adapter" => run.id.clone()).record(run.elapsed.as_secs_f64());
            match run.result {
                Ok(candidates) => {
                    if let Some(alert) = self.monitor.record(&run.id, candidates.len(), run.elapsed, None) {
                        report.alerts.push(alert);
                    }
                    if let Some(adapter) = run.adapter {
                        batches.push(AdapterBatch {
                            tagger: VenueTagger::with_default_venue(city, adapter.default_venue().cloned()),
                            adapter_id: run.id,
                            candidates,
                        });
                    }
                }
                Err(failure) => {
                    warn!(adapter = %run.id, "Adapter failed: {}", failure);
                    counter!(ADAPTER_FAILURES_TOTAL, "adapter" => run.id.clone()).increment(1);
                    if let Some(alert) = self.monitor.record(&run.id, 0, run.elapsed, Some(failure.to_string())) {
                        report.alerts.push(alert);
                    }
                    report.failure_reasons.insert(run.id.clone(), failure.to_string());
                    report.failed_adapters.push(run.id);
                }
            }
        }
        batches
    }

    /// Validate, normalize and tag every candidate, stage by stage.
    fn process(&self, city: City, batches: Vec<AdapterBatch>, report: &mut ImportReport) -> Vec<NormalizedEvent> {
        report.candidates = batches.iter().map(|b| b.candidates.len()).sum();
        counter!(CANDIDATES_TOTAL, "city" => city.name()).increment(report.candidates as u64);

        self.enter(city, ImportPhase::Validating);
        let mut accepted: Vec<(usize, RawCandidate)> = Vec::with_capacity(report.candidates);
        for (batch_index, batch) in batches.iter().enumerate() {
            for candidate in &batch.candidates {
                match validate(candidate) {
                    Ok(()) => accepted.push((batch_index, candidate.clone())),
                    Err(reason) => {
                        debug!(adapter = %batch.adapter_id, reason = reason.as_str(), "Rejected candidate");
                        *report.rejected.entry(reason.as_str()).or_insert(0) += 1;
                        counter!(REJECTED_TOTAL, "reason" => reason.as_str()).increment(1);
                    }
                }
            }
        }

        self.enter(city, ImportPhase::Normalizing);
        let dates = match self.today {
            Some(today) => DateNormalizer::new(today),
            None => DateNormalizer::for_today(),
        };
        let dated: Vec<(usize, RawCandidate, Option<EventDate>)> = accepted
            .into_iter()
            .map(|(batch_index, candidate)| {
                let date = candidate.date_text.as_deref().and_then(|t| dates.normalize(t));
                (batch_index, candidate, date)
            })
            .collect();

        self.enter(city, ImportPhase::Tagging);
        let mut events = Vec::with_capacity(dated.len());
        for (batch_index, candidate, date) in dated {
            let batch = &batches[batch_index];
            let venue = match batch.tagger.resolve(candidate.venue_text.as_ref()) {
                Ok(venue) => venue,
                Err(reason) => {
                    warn!(
                        adapter = %batch.adapter_id,
                        reason = reason.as_str(),
                        "Unresolved venue for '{}': {}",
                        candidate.title.as_deref().unwrap_or_default(),
                        reason
                    );
                    report.unresolved_venues += 1;
                    counter!(UNRESOLVED_VENUES_TOTAL, "adapter" => batch.adapter_id.clone()).increment(1);
                    continue;
                }
            };
            let title = candidate
                .title
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let description = non_blank(candidate.description);
            let category = resolve_category(candidate.category.as_deref(), &title, description.as_deref());
            events.push(NormalizedEvent {
                dedupe_key: dedupe_key(&title, &venue.name, date.as_ref()),
                title,
                date,
                venue,
                url: non_blank(candidate.url),
                description,
                image_url: non_blank(candidate.image_url),
                category,
                source: batch.adapter_id.clone(),
                click_count: 0,
            });
        }
        events
    }
}

struct SourceAdapterRun {
    id: String,
    adapter: Option<SourceAdapter>,
    elapsed: Duration,
    result: std::result::Result<Vec<RawCandidate>, AdapterFailure>,
}

/// One bounded adapter invocation. The fetch runs on its own task so a panic
/// or a hang stays contained to this adapter.
async fn run_adapter(
    adapter: &SourceAdapter,
    timeout: Duration,
) -> std::result::Result<Vec<RawCandidate>, AdapterFailure> {
    let task_adapter = adapter.clone();
    let mut handle = tokio::spawn(async move { task_adapter.fetch().await });
    match tokio::time::timeout(timeout, &mut handle).await {
        Err(_) => {
            handle.abort();
            Err(AdapterFailure::Timeout { after: timeout })
        }
        Ok(Err(join_error)) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(AdapterFailure::Panicked(message))
        }
        Ok(Err(join_error)) => Err(AdapterFailure::Errored(join_error.to_string())),
        Ok(Ok(Err(e))) => Err(AdapterFailure::Errored(e.to_string())),
        Ok(Ok(Ok(candidates))) => Ok(candidates),
    }
}

fn commit_error(city: City, err: IngestError) -> IngestError {
    IngestError::Commit {
        city: city.name().to_string(),
        message: err.to_string(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterExport;
    use crate::storage::InMemoryEventStore;
    use std::sync::atomic::AtomicUsize;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn candidate(title: &str, date: &str, venue: &str) -> RawCandidate {
        RawCandidate {
            title: Some(title.to_string()),
            date_text: Some(date.to_string()),
            venue_text: Some(crate::types::VenueInput::Text(venue.to_string())),
            ..Default::default()
        }
    }

    fn orchestrator(registry: AdapterRegistry, store: Arc<InMemoryEventStore>) -> ImportOrchestrator {
        ImportOrchestrator::new(registry, store).with_today(today())
    }

    #[tokio::test]
    async fn test_pipeline_counts_each_outcome() {
        let mut registry = AdapterRegistry::new();
        registry.register_export(
            "commodore",
            City::Vancouver,
            AdapterExport::sync_fn(|_| {
                Ok(vec![
                    candidate("Khruangbin", "Sep 12, 2025 8pm", "Commodore Ballroom"),
                    candidate("Menu", "Sep 12, 2025", "Commodore Ballroom"),
                    candidate("Mystery Show", "TBA", "Commodore Ballroom"),
                    RawCandidate::titled("Nowhere Gig"),
                ])
            }),
            None,
        );
        let store = Arc::new(InMemoryEventStore::new());
        let orchestrator = orchestrator(registry, store.clone());

        let report = orchestrator.import_city(City::Vancouver).await.unwrap();
        assert_eq!(report.candidates, 4);
        assert_eq!(report.rejected_total(), 1);
        assert_eq!(report.unresolved_venues, 1);
        assert_eq!(report.undated, 1);
        assert_eq!(report.imported, 2);
        assert!(report.committed);
        assert_eq!(orchestrator.phase(), ImportPhase::Idle);

        let stored = store.events_for_city(City::Vancouver).await.unwrap();
        assert_eq!(stored[0].date.as_deref(), Some("2025-09-12T20:00:00"));
        assert_eq!(stored[0].location.as_deref(), Some("Commodore Ballroom, Vancouver"));
        assert!(stored[1].date.is_none());
    }

    #[tokio::test]
    async fn test_timeout_marks_adapter_failed() {
        let mut registry = AdapterRegistry::new();
        registry
            .register_export(
                "slow",
                City::Calgary,
                AdapterExport::async_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(vec![])
                }),
                None,
            )
            .register_export(
                "quick",
                City::Calgary,
                AdapterExport::sync_fn(|_| Ok(vec![candidate("Stampede Rodeo", "Jul 5, 2025", "Grandstand")])),
                None,
            );
        let orchestrator = orchestrator(registry, Arc::new(InMemoryEventStore::new())).with_options(ImportOptions {
            adapter_timeout: Duration::from_millis(50),
            max_concurrent_adapters: 1,
        });

        let report = orchestrator.import_city(City::Calgary).await.unwrap();
        assert_eq!(report.failed_adapters, vec!["slow"]);
        assert!(report.failure_reasons["slow"].contains("timed out"));
        assert_eq!(report.imported, 1);
    }

    #[tokio::test]
    async fn test_panicking_adapter_is_contained() {
        let mut registry = AdapterRegistry::new();
        registry
            .register_export(
                "boom",
                City::Montreal,
                AdapterExport::async_fn(|_| async {
                    if true {
                        panic!("selector changed");
                    }
                    Ok(vec![])
                }),
                None,
            )
            .register_export(
                "ok",
                City::Montreal,
                AdapterExport::sync_fn(|_| Ok(vec![candidate("Piknic Électronik", "Aug 3, 2025", "Parc Jean-Drapeau")])),
                None,
            );
        let orchestrator = orchestrator(registry, Arc::new(InMemoryEventStore::new()));

        let report = orchestrator.import_city(City::Montreal).await.unwrap();
        assert_eq!(report.failed_adapters, vec!["boom"]);
        assert!(report.failure_reasons["boom"].contains("selector changed"));
        assert_eq!(report.imported, 1);
    }

    #[tokio::test]
    async fn test_all_adapters_failing_keeps_previous_data() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut seed = AdapterRegistry::new();
        seed.register_export(
            "rom",
            City::Toronto,
            AdapterExport::sync_fn(|_| Ok(vec![candidate("Friday Night Live", "Jul 25, 2025", "ROM")])),
            None,
        );
        orchestrator(seed, store.clone()).import_city(City::Toronto).await.unwrap();

        let mut broken = AdapterRegistry::new();
        broken.register_export(
            "rom",
            City::Toronto,
            AdapterExport::sync_fn(|_| Err(IngestError::adapter("rom", "503"))),
            None,
        );
        let report = orchestrator(broken, store.clone()).import_city(City::Toronto).await.unwrap();
        assert!(!report.committed);
        assert!(report.skipped_commit.is_some());
        assert_eq!(store.events_for_city(City::Toronto).await.unwrap().len(), 1);
    }

    /// Geocoder that records a click on every stored Vancouver event while it
    /// "looks up" an address.
    struct ClickingGeocoder {
        store: Arc<InMemoryEventStore>,
    }

    #[async_trait::async_trait]
    impl crate::geocode::Geocoder for ClickingGeocoder {
        async fn lookup(&self, _address: &str) -> Result<Option<crate::types::Coordinates>> {
            let mut events = self.store.events_for_city(City::Vancouver).await?;
            for event in &mut events {
                event.click_count += 10;
            }
            self.store.replace_city(City::Vancouver, events).await?;
            Ok(Some(crate::types::Coordinates { lat: 49.28, lng: -123.12 }))
        }
    }

    #[tokio::test]
    async fn test_clicks_recorded_during_geocoding_survive_refresh() {
        let store = Arc::new(InMemoryEventStore::with_events(vec![crate::types::StoredEvent {
            id: Some("gala".to_string()),
            title: "Symphony Gala".to_string(),
            date: Some("2025-10-04".to_string()),
            venue: crate::types::Venue {
                name: "Orpheum".to_string(),
                address: Some("601 Smithe St".to_string()),
                city: City::Vancouver,
                coordinates: None,
            },
            location: None,
            url: None,
            description: None,
            image_url: None,
            category: None,
            source: "orpheum".to_string(),
            click_count: 5,
        }]));
        let mut registry = AdapterRegistry::new();
        registry.register_export(
            "orpheum",
            City::Vancouver,
            AdapterExport::sync_fn(|_| {
                Ok(vec![RawCandidate {
                    title: Some("Symphony Gala".to_string()),
                    date_text: Some("Oct 4, 2025".to_string()),
                    venue_text: Some(crate::types::VenueInput::Structured(crate::types::StructuredVenue {
                        name: Some("Orpheum".to_string()),
                        address: Some("601 Smithe St".to_string()),
                        city: None,
                    })),
                    ..Default::default()
                }])
            }),
            None,
        );
        let geocoder = RateLimitedGeocoder::new(
            Arc::new(ClickingGeocoder { store: store.clone() }),
            Duration::ZERO,
            16,
        );
        let orchestrator = orchestrator(registry, store.clone()).with_geocoder(Arc::new(geocoder));

        let report = orchestrator.import_city(City::Vancouver).await.unwrap();
        assert_eq!(report.geocoded, 1);
        assert_eq!(report.restored_engagement, 1);

        let events = store.events_for_city(City::Vancouver).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].click_count, 15);
        assert!(events[0].venue.coordinates.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_adapters_keep_registration_order() {
        let mut registry = AdapterRegistry::new();
        registry
            .register_export(
                "slow_primary",
                City::NewYork,
                AdapterExport::async_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    Ok(vec![RawCandidate {
                        description: Some("from primary".to_string()),
                        ..candidate("Jazz Night", "Dec 19, 2025", "Blue Note")
                    }])
                }),
                None,
            )
            .register_export(
                "slow_broken",
                City::NewYork,
                AdapterExport::async_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Err(IngestError::adapter("slow_broken", "502"))
                }),
                None,
            )
            .register_export(
                "fast_mirror",
                City::NewYork,
                AdapterExport::async_fn(|_| async {
                    Ok(vec![RawCandidate {
                        description: Some("from mirror".to_string()),
                        ..candidate("Jazz Night", "2025-12-19", "Blue Note")
                    }])
                }),
                None,
            )
            .register_export(
                "fast_broken",
                City::NewYork,
                AdapterExport::sync_fn(|_| Err(IngestError::adapter("fast_broken", "403"))),
                None,
            );
        let store = Arc::new(InMemoryEventStore::new());
        let orchestrator = orchestrator(registry, store.clone()).with_options(ImportOptions {
            adapter_timeout: Duration::from_secs(5),
            max_concurrent_adapters: 4,
        });

        let report = orchestrator.import_city(City::NewYork).await.unwrap();
        assert_eq!(report.failed_adapters, vec!["slow_broken", "fast_broken"]);
        assert_eq!(report.deduped, 1);

        let events = store.events_for_city(City::NewYork).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "slow_primary");
        assert_eq!(events[0].description.as_deref(), Some("from primary"));
    }

    #[tokio::test]
    async fn test_cancel_between_adapters() {
        let mut registry = AdapterRegistry::new();
        let orchestrator_flag = Arc::new(AtomicBool::new(false));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let flag = orchestrator_flag.clone();
        registry.register_export(
            "first",
            City::NewYork,
            AdapterExport::sync_fn(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(vec![candidate("Jazz Night", "Dec 19, 2025", "Blue Note")])
            }),
            None,
        );
        let calls = second_calls.clone();
        registry.register_export(
            "second",
            City::NewYork,
            AdapterExport::sync_fn(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            }),
            None,
        );

        let store = Arc::new(InMemoryEventStore::new());
        let mut orchestrator = orchestrator(registry, store.clone());
        orchestrator.cancel = orchestrator_flag;

        let report = orchestrator.import_city(City::NewYork).await.unwrap();
        assert!(report.cancelled);
        assert!(!report.committed);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert!(store.all_events().await.unwrap().is_empty());
    }
}
