use crate::error::{IngestError, Result};
use crate::monitoring::MonitorSettings;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub import: ImportConfig,
    pub store: StoreConfig,
    pub sources: SourcesConfig,
    pub geocoder: GeocoderConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    pub adapter_timeout_secs: u64,
    /// 1 runs adapters one after another.
    pub max_concurrent_adapters: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: 10,
            max_concurrent_adapters: 1,
        }
    }
}

impl ImportConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/events.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub registry_dir: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            registry_dir: PathBuf::from("registry/sources"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub user_agent: String,
    pub min_delay_ms: u64,
    pub cache_capacity: usize,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("event_ingest/", env!("CARGO_PKG_VERSION")).to_string(),
            min_delay_ms: 1000,
            cache_capacity: 1000,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub alert_threshold: usize,
    pub history_length: usize,
    pub alert_cooldown_hours: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            history_length: 10,
            alert_cooldown_hours: 24,
        }
    }
}

impl MonitoringConfig {
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            alert_threshold: self.alert_threshold,
            history_length: self.history_length,
            alert_cooldown: chrono::Duration::hours(self.alert_cooldown_hours),
        }
    }
}

impl Config {
    /// Loads `.env`, then the file named by `INGEST_CONFIG` (default
    /// `config.toml`), then applies environment overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = std::env::var("INGEST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// A missing file yields the defaults; an unreadable or invalid one is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = std::env::var("INGEST_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.store.sqlite_path = PathBuf::from(db_path);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.import.max_concurrent_adapters == 0 {
            return Err(IngestError::Config(
                "import.max_concurrent_adapters must be at least 1".to_string(),
            ));
        }
        if self.import.adapter_timeout_secs == 0 {
            return Err(IngestError::Config(
                "import.adapter_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_from("/nonexistent/config.toml").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.import.adapter_timeout(), Duration::from_secs(10));
        assert!(!config.geocoder.enabled);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [import]
            max_concurrent_adapters = 4

            [monitoring]
            alert_threshold = 5
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.import.max_concurrent_adapters, 4);
        assert_eq!(config.import.adapter_timeout_secs, 10);
        assert_eq!(config.monitoring.settings().alert_threshold, 5);
        assert_eq!(config.store.sqlite_path, PathBuf::from("data/events.db"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[import]\nmax_concurrent_adapters = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(IngestError::Config(_))));
    }
}
