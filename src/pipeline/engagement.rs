use crate::pipeline::dates::parse_iso;
use crate::pipeline::dedup::dedupe_key;
use crate::types::{City, NormalizedEvent, StoredEvent};
use std::collections::HashMap;
use tracing::debug;

/// Click counts captured before a destructive refresh, keyed by dedupe key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngagementSnapshot {
    clicks: HashMap<String, u64>,
}

impl EngagementSnapshot {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.clicks.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.clicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }
}

/// How many restored events found a prior count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub fresh: usize,
}

/// Dedupe key of a stored record, recomputed from its persisted fields.
pub fn stored_key(event: &StoredEvent) -> String {
    let date = event.date.as_deref().and_then(|d| parse_iso(d.trim()));
    dedupe_key(&event.title, &event.venue.name, date.as_ref())
}

/// Snapshots click counts of `city`'s scraped records. Admin-curated records
/// are left out; they are not part of the refresh.
pub fn snapshot(prior: &[StoredEvent], city: City) -> EngagementSnapshot {
    let mut clicks: HashMap<String, u64> = HashMap::new();
    for event in prior.iter().filter(|e| e.city() == city && !e.is_admin()) {
        // Legacy duplicates under one key keep the highest count
        let entry = clicks.entry(stored_key(event)).or_insert(0);
        *entry = (*entry).max(event.click_count);
    }
    debug!(city = %city, keys = clicks.len(), "Captured engagement snapshot");
    EngagementSnapshot { clicks }
}

/// Copies prior click counts onto freshly ingested events; unmatched start at 0.
pub fn restore(events: &mut [NormalizedEvent], snapshot: &EngagementSnapshot) -> RestoreSummary {
    let mut summary = RestoreSummary::default();
    for event in events.iter_mut() {
        match snapshot.get(&event.dedupe_key) {
            Some(count) => {
                event.click_count = count;
                summary.restored += 1;
            }
            None => {
                event.click_count = 0;
                summary.fresh += 1;
            }
        }
    }
    summary
}
