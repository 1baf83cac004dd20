use crate::metrics::ADAPTER_ALERTS_TOTAL;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub alert_threshold: usize,
    pub history_length: usize,
    pub alert_cooldown: ChronoDuration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            history_length: 10,
            alert_cooldown: ChronoDuration::hours(24),
        }
    }
}

/// One adapter invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterRun {
    pub at: DateTime<Utc>,
    pub event_count: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl AdapterRun {
    /// Zero candidates counts as a failure too: a scraper that silently
    /// finds nothing is usually broken.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.event_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterAlert {
    pub adapter: String,
    pub consecutive_failures: usize,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterHealth {
    pub adapter: String,
    pub consecutive_failures: usize,
    pub last_alerted: Option<DateTime<Utc>>,
    pub runs: Vec<AdapterRun>,
}

#[derive(Debug, Default)]
struct History {
    runs: VecDeque<AdapterRun>,
    last_alerted: Option<DateTime<Utc>>,
}

impl History {
    fn consecutive_failures(&self) -> usize {
        self.runs.iter().rev().take_while(|run| !run.succeeded()).count()
    }
}

/// Per-adapter run history with consecutive-failure alerting.
/// One instance is shared by every city import in the process.
#[derive(Debug, Default)]
pub struct AdapterHealthMonitor {
    settings: MonitorSettings,
    histories: Mutex<BTreeMap<String, History>>,
}

impl AdapterHealthMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            histories: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(
        &self,
        adapter: &str,
        event_count: usize,
        duration: Duration,
        error: Option<String>,
    ) -> Option<AdapterAlert> {
        self.record_at(adapter, event_count, duration, error, Utc::now())
    }

    pub fn record_at(
        &self,
        adapter: &str,
        event_count: usize,
        duration: Duration,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Option<AdapterAlert> {
        let duration_ms = duration.as_millis() as u64;
        match &error {
            // The orchestrator already warns about the failure itself
            Some(e) => debug!("Adapter [{}] FAILED: {} events in {}ms - {}", adapter, event_count, duration_ms, e),
            None if event_count == 0 => warn!("Adapter [{}] NO EVENTS: 0 events in {}ms", adapter, duration_ms),
            None => info!("Adapter [{}] SUCCESS: {} events in {}ms", adapter, event_count, duration_ms),
        }

        let mut histories = self.lock();
        let history = histories.entry(adapter.to_string()).or_default();
        history.runs.push_back(AdapterRun {
            at,
            event_count,
            duration_ms,
            error,
        });
        while history.runs.len() > self.settings.history_length.max(1) {
            history.runs.pop_front();
        }

        let failures = history.consecutive_failures();
        if failures < self.settings.alert_threshold.max(1) {
            return None;
        }
        let cooled_down = history
            .last_alerted
            .map_or(true, |last| at - last >= self.settings.alert_cooldown);
        if !cooled_down {
            return None;
        }

        history.last_alerted = Some(at);
        counter!(ADAPTER_ALERTS_TOTAL, "adapter" => adapter.to_string()).increment(1);
        warn!(
            "⚠️ Adapter alert: {} has failed {} consecutive times; check the adapter and its source",
            adapter, failures
        );
        Some(AdapterAlert {
            adapter: adapter.to_string(),
            consecutive_failures: failures,
            at,
        })
    }

    pub fn snapshot(&self) -> Vec<AdapterHealth> {
        self.lock()
            .iter()
            .map(|(adapter, history)| AdapterHealth {
                adapter: adapter.clone(),
                consecutive_failures: history.consecutive_failures(),
                last_alerted: history.last_alerted,
                runs: history.runs.iter().cloned().collect(),
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, History>> {
        // History is advisory; a poisoned lock still holds usable data
        self.histories.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
