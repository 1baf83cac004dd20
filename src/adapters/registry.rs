use super::json_feed::JsonFeedAdapter;
use super::json_file::JsonFileAdapter;
use super::{AdapterExport, AdapterFailure, SourceAdapter};
use crate::error::{IngestError, Result};
use crate::pipeline::venue::DefaultVenue;
use crate::types::City;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One source as declared in the registry directory.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub source_id: String,
    pub city: City,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: SourceKind,
    #[serde(default)]
    pub default_venue: Option<DefaultVenue>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    JsonFile { path: PathBuf },
    JsonFeed { url: String },
}

/// A registered adapter, or the reason it could not be loaded.
#[derive(Debug, Clone)]
pub enum RegistryEntry {
    Ready(SourceAdapter),
    Broken {
        id: String,
        city: City,
        failure: AdapterFailure,
    },
}

impl RegistryEntry {
    pub fn id(&self) -> &str {
        match self {
            RegistryEntry::Ready(adapter) => adapter.id(),
            RegistryEntry::Broken { id, .. } => id,
        }
    }

    pub fn city(&self) -> City {
        match self {
            RegistryEntry::Ready(adapter) => adapter.city(),
            RegistryEntry::Broken { city, .. } => *city,
        }
    }
}

/// Adapters grouped by the city they are scoped to, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    entries: Vec<RegistryEntry>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: SourceAdapter) -> &mut Self {
        self.entries.push(RegistryEntry::Ready(adapter));
        self
    }

    /// Probes `export`; a malformed export is kept as a broken entry so each
    /// run reports it as a failed adapter.
    pub fn register_export(
        &mut self,
        id: impl Into<String>,
        city: City,
        export: AdapterExport,
        default_venue: Option<DefaultVenue>,
    ) -> &mut Self {
        let id = id.into();
        match SourceAdapter::load(id.clone(), city, export) {
            Ok(adapter) => self.register(adapter.with_default_venue(default_venue)),
            Err(failure) => {
                warn!(adapter = %id, "Cannot determine how to run adapter: {}", failure);
                self.entries.push(RegistryEntry::Broken { id, city, failure });
                self
            }
        }
    }

    /// Loads every `*.json` source config in `registry_dir`, sorted by file
    /// name so adapter order is stable between runs. Disabled sources are skipped.
    pub fn load_from_directory<P: AsRef<Path>>(registry_dir: P, client: reqwest::Client) -> Result<Self> {
        let dir_path = registry_dir.as_ref();
        if !dir_path.exists() {
            return Err(IngestError::Config(format!(
                "Registry directory does not exist: {}",
                dir_path.display()
            )));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir_path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let config = match read_source_config(&path) {
                Ok(config) => config,
                Err(rejected) => {
                    registry.record_unreadable(&path, rejected);
                    continue;
                }
            };
            if !config.enabled {
                info!(source = %config.source_id, "Source disabled, skipping");
                continue;
            }
            let export = match &config.kind {
                SourceKind::JsonFile { path } => {
                    let resolved = if path.is_absolute() {
                        path.clone()
                    } else {
                        dir_path.join(path)
                    };
                    AdapterExport::object(JsonFileAdapter::new(config.source_id.clone(), resolved))
                }
                SourceKind::JsonFeed { url } => AdapterExport::object(JsonFeedAdapter::new(
                    config.source_id.clone(),
                    url.clone(),
                    client.clone(),
                )),
            };
            registry.register_export(config.source_id, config.city, export, config.default_venue);
        }

        info!("Loaded {} sources from {}", registry.entries.len(), dir_path.display());
        Ok(registry)
    }

    /// A config that could not be turned into an adapter still shows up as a
    /// failed adapter for its city, when the city can be read at all.
    fn record_unreadable(&mut self, path: &Path, rejected: UnreadableConfig) {
        let UnreadableConfig { raw, reason } = rejected;
        let field = |name: &str| raw.as_ref().and_then(|v| v.get(name));
        if field("enabled").and_then(|v| v.as_bool()) == Some(false) {
            info!(path = %path.display(), "Disabled source with invalid config, skipping");
            return;
        }
        let city = field("city").and_then(|v| v.as_str()).and_then(|c| c.parse::<City>().ok());
        let Some(city) = city else {
            warn!(path = %path.display(), "Skipping source config: {}", reason);
            return;
        };
        let id = field("source_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .unwrap_or_else(|| path.display().to_string());
        warn!(adapter = %id, path = %path.display(), "Invalid source config: {}", reason);
        self.entries.push(RegistryEntry::Broken {
            id,
            city,
            failure: AdapterFailure::MalformedShape(format!("invalid source config: {}", reason)),
        });
    }

    pub fn for_city(&self, city: City) -> Vec<RegistryEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.city() == city)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A source config file that did not parse, with whatever JSON it held.
struct UnreadableConfig {
    raw: Option<serde_json::Value>,
    reason: String,
}

fn read_source_config(path: &Path) -> std::result::Result<SourceConfig, UnreadableConfig> {
    let content = fs::read_to_string(path).map_err(|e| UnreadableConfig {
        raw: None,
        reason: e.to_string(),
    })?;
    let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| UnreadableConfig {
        raw: None,
        reason: e.to_string(),
    })?;
    serde_json::from_value(raw.clone()).map_err(|e| UnreadableConfig {
        raw: Some(raw),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterObject;
    use serde_json::json;
    use tempfile::tempdir;

    struct Inert;
    impl AdapterObject for Inert {}

    #[test]
    fn test_load_from_directory_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        let write = |name: &str, value: serde_json::Value| {
            std::fs::write(dir.path().join(name), value.to_string()).unwrap();
        };
        write(
            "b_rom.json",
            json!({
                "source_id": "rom",
                "city": "Toronto",
                "kind": "json_file",
                "path": "rom_events.json",
                "default_venue": {"name": "Royal Ontario Museum (ROM)"}
            }),
        );
        write(
            "a_horseshoe.json",
            json!({
                "source_id": "horseshoe",
                "city": "toronto",
                "kind": "json_feed",
                "url": "http://localhost:9/horseshoe"
            }),
        );
        write(
            "c_off.json",
            json!({
                "source_id": "retired",
                "city": "Toronto",
                "enabled": false,
                "kind": "json_file",
                "path": "x.json"
            }),
        );
        write("notes.txt", json!("ignored"));

        let registry = AdapterRegistry::load_from_directory(dir.path(), reqwest::Client::new()).unwrap();
        let ids: Vec<String> = registry
            .for_city(City::Toronto)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["horseshoe", "rom"]);
        assert!(registry.for_city(City::Vancouver).is_empty());

        match &registry.for_city(City::Toronto)[1] {
            RegistryEntry::Ready(adapter) => {
                assert_eq!(adapter.kind().label(), "object with scrape");
                assert_eq!(
                    adapter.default_venue().map(|v| v.name.as_str()),
                    Some("Royal Ontario Museum (ROM)")
                );
            }
            other => panic!("expected ready adapter, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_does_not_drop_other_sources() {
        let dir = tempdir().unwrap();
        let write = |name: &str, content: String| {
            std::fs::write(dir.path().join(name), content).unwrap();
        };
        write(
            "a_good.json",
            json!({"source_id": "good", "city": "Calgary", "kind": "json_file", "path": "good.json"}).to_string(),
        );
        write(
            "b_scraper.json",
            json!({"source_id": "scraper", "city": "Calgary", "kind": "html_scraper"}).to_string(),
        );
        write(
            "c_no_city.json",
            json!({"source_id": "nowhere", "kind": "json_file", "path": "x.json"}).to_string(),
        );
        write("d_truncated.json", "{\"source_id\": \"cut".to_string());

        let registry = AdapterRegistry::load_from_directory(dir.path(), reqwest::Client::new()).unwrap();
        assert_eq!(registry.len(), 2);

        let calgary = registry.for_city(City::Calgary);
        assert!(matches!(&calgary[0], RegistryEntry::Ready(adapter) if adapter.id() == "good"));
        match &calgary[1] {
            RegistryEntry::Broken { id, failure, .. } => {
                assert_eq!(id, "scraper");
                assert!(matches!(failure, AdapterFailure::MalformedShape(msg) if msg.starts_with("invalid source config")));
            }
            other => panic!("expected broken entry, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let err = AdapterRegistry::load_from_directory("/nonexistent/registry", reqwest::Client::new())
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_malformed_export_recorded_as_broken() {
        let mut registry = AdapterRegistry::new();
        registry.register_export("inert", City::Calgary, AdapterExport::object(Inert), None);
        match &registry.for_city(City::Calgary)[0] {
            RegistryEntry::Broken { id, failure, .. } => {
                assert_eq!(id, "inert");
                assert!(matches!(failure, AdapterFailure::MalformedShape(_)));
            }
            other => panic!("expected broken entry, got {:?}", other),
        }
    }
}
