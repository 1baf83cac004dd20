use crate::constants::{DEDUPE_KEY_DELIMITER, UNDATED_TOKEN};
use crate::types::{EventDate, NormalizedEvent};
use std::collections::HashMap;

/// Identity key for an event: normalized title, venue name and calendar day.
///
/// Pure function of its inputs, so any adapter that reports the same logical
/// event produces the same key.
pub fn dedupe_key(title: &str, venue_name: &str, date: Option<&EventDate>) -> String {
    let day = date
        .map(|d| d.day().format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNDATED_TOKEN.to_string());
    [normalize_key_part(title), normalize_key_part(venue_name), day].join(DEDUPE_KEY_DELIMITER)
}

/// Key for an already-normalized event.
pub fn event_key(event: &NormalizedEvent) -> String {
    dedupe_key(&event.title, &event.venue.name, event.date.as_ref())
}

/// Lowercase, trimmed, internal whitespace collapsed to one space. The
/// delimiter is backslash-escaped so parts cannot bleed into each other.
fn normalize_key_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace(DEDUPE_KEY_DELIMITER, &format!("\\{}", DEDUPE_KEY_DELIMITER))
}

/// Result of collapsing a batch to one record per key.
#[derive(Debug, Clone)]
pub struct DedupeOutcome {
    pub events: Vec<NormalizedEvent>,
    pub removed: usize,
}

/// Keeps at most one event per `dedupe_key`, in first-seen order.
///
/// On a key collision the dated record beats the undated one, then the record
/// with more of description/url populated; otherwise the first seen stays.
pub fn dedupe(events: Vec<NormalizedEvent>) -> DedupeOutcome {
    let total = events.len();
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(total);
    let mut kept: Vec<NormalizedEvent> = Vec::with_capacity(total);

    for event in events {
        match slots.get(&event.dedupe_key) {
            Some(&idx) => {
                if prefer(&event, &kept[idx]) {
                    kept[idx] = event;
                }
            }
            None => {
                slots.insert(event.dedupe_key.clone(), kept.len());
                kept.push(event);
            }
        }
    }

    DedupeOutcome {
        removed: total - kept.len(),
        events: kept,
    }
}

/// True if `challenger` should replace `incumbent`.
fn prefer(challenger: &NormalizedEvent, incumbent: &NormalizedEvent) -> bool {
    match (challenger.date.is_some(), incumbent.date.is_some()) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => richness(challenger) > richness(incumbent),
        (false, false) => false,
    }
}

fn richness(event: &NormalizedEvent) -> u8 {
    let populated = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());
    populated(&event.description) as u8 + populated(&event.url) as u8
}
