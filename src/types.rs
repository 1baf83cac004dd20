use crate::error::IngestError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The closed set of cities the catalog serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum City {
    Vancouver,
    Toronto,
    Montreal,
    Calgary,
    NewYork,
}

impl City {
    pub const ALL: [City; 5] = [
        City::Vancouver,
        City::Toronto,
        City::Montreal,
        City::Calgary,
        City::NewYork,
    ];

    /// Canonical display name, also the persisted city token.
    pub fn name(&self) -> &'static str {
        match self {
            City::Vancouver => "Vancouver",
            City::Toronto => "Toronto",
            City::Montreal => "Montreal",
            City::Calgary => "Calgary",
            City::NewYork => "New York",
        }
    }

    /// Region names (full and abbreviated) used in addresses for this city.
    pub fn regions(&self) -> &'static [&'static str] {
        match self {
            City::Vancouver => &["british columbia", "bc", "b.c."],
            City::Toronto => &["ontario", "on"],
            City::Montreal => &["quebec", "québec", "qc"],
            City::Calgary => &["alberta", "ab"],
            City::NewYork => &["new york", "ny", "new york state"],
        }
    }

    pub fn country(&self) -> &'static str {
        match self {
            City::NewYork => "usa",
            _ => "canada",
        }
    }

    /// Lowercase spellings accepted when parsing a city token.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            City::Vancouver => &["vancouver", "van", "yvr"],
            City::Toronto => &["toronto", "yyz"],
            City::Montreal => &["montreal", "montréal", "mtl", "yul"],
            City::Calgary => &["calgary", "yyc"],
            City::NewYork => &["new york", "new york city", "nyc", "new-york", "ny"],
        }
    }

    /// True when `address` says nothing beyond "City, Region[, Country]".
    pub fn is_generic_address(&self, address: &str) -> bool {
        let parts: Vec<String> = address
            .split(',')
            .map(|p| p.trim().trim_end_matches('.').to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return true;
        }
        let is_city = |p: &str| self.aliases().contains(&p);
        let is_region = |p: &str| self.regions().contains(&p);
        let is_country = |p: &str| {
            p == self.country() || matches!(p, "us" | "united states" | "ca")
        };
        if !is_city(&parts[0]) {
            return false;
        }
        parts[1..]
            .iter()
            .all(|p| is_region(p) || is_country(p))
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for City {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        City::ALL
            .iter()
            .copied()
            .find(|city| city.aliases().contains(&token.as_str()))
            .ok_or_else(|| IngestError::UnknownCity(s.trim().to_string()))
    }
}

impl Serialize for City {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for City {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Candidate event as produced by a source adapter. Nothing here is trusted.
///
/// Deserialization is lenient: producers spell fields differently (`name`,
/// `startDate`, `sourceURL`, ...) and sometimes send several spellings at once.
/// The first non-null string wins and non-string values read as absent.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    pub title: Option<String>,
    pub date_text: Option<String>,
    pub venue_text: Option<VenueInput>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

const TITLE_KEYS: &[&str] = &["title", "name"];
const DATE_KEYS: &[&str] = &["dateText", "startDate", "date"];
const VENUE_KEYS: &[&str] = &["venueText", "venue"];
const URL_KEYS: &[&str] = &["url", "sourceURL", "sourceUrl"];
const IMAGE_KEYS: &[&str] = &["imageUrl", "image"];

fn first_string(map: &serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

impl RawCandidate {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Builds a candidate from one JSON record. Only non-objects are refused.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let venue_text = VENUE_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(VenueInput::from_json);
        Self {
            title: first_string(map, TITLE_KEYS),
            date_text: first_string(map, DATE_KEYS),
            venue_text,
            url: first_string(map, URL_KEYS),
            description: first_string(map, &["description"]),
            image_url: first_string(map, IMAGE_KEYS),
            category: first_string(map, &["category"]),
        }
    }
}

impl<'de> Deserialize<'de> for RawCandidate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(RawCandidate::from_json_map(&map))
    }
}

/// Venue as a source phrased it: either bare text or a partial object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VenueInput {
    Text(String),
    Structured(StructuredVenue),
}

impl VenueInput {
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(text) => Some(VenueInput::Text(text.clone())),
            serde_json::Value::Object(map) => Some(VenueInput::Structured(StructuredVenue {
                name: first_string(map, &["name"]),
                address: first_string(map, &["address"]),
                city: first_string(map, &["city"]),
            })),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructuredVenue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Canonical venue identity attached to every normalized event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Venue {
    pub name: String,
    pub address: Option<String>,
    pub city: City,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// A normalized event date: either a calendar day or a local date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventDate {
    Day(NaiveDate),
    DateTime(NaiveDateTime),
}

impl EventDate {
    /// Calendar day, dropping any time of day.
    pub fn day(&self) -> NaiveDate {
        match self {
            EventDate::Day(d) => *d,
            EventDate::DateTime(dt) => dt.date(),
        }
    }

    pub fn to_iso_string(&self) -> String {
        match self {
            EventDate::Day(d) => d.format("%Y-%m-%d").to_string(),
            EventDate::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    /// Parses the two forms produced by `to_iso_string`.
    pub fn parse_iso(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
            return Some(EventDate::DateTime(dt));
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(EventDate::Day)
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

impl Serialize for EventDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}

impl<'de> Deserialize<'de> for EventDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EventDate::parse_iso(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO date: {raw}")))
    }
}

/// Pipeline output. `date == None` means the date is unknown, never guessed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub title: String,
    pub date: Option<EventDate>,
    pub venue: Venue,
    pub url: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub source: String,
    pub dedupe_key: String,
    pub click_count: u64,
}

impl NormalizedEvent {
    pub fn is_undated(&self) -> bool {
        self.date.is_none()
    }
}

/// Flat, store-facing document for one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Records without an id are legacy and excluded from id lookups.
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub date: Option<String>,
    pub venue: Venue,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub source: String,
    #[serde(default)]
    pub click_count: u64,
}

impl StoredEvent {
    pub fn city(&self) -> City {
        self.venue.city
    }

    pub fn is_admin(&self) -> bool {
        self.source == crate::constants::ADMIN_SOURCE
    }
}
