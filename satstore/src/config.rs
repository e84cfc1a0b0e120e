use crate::errors::{Result, StorageError};
use crate::models::IngestMode;
use crate::normalize::NumericFallback;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding `database.base_path`.
pub const BASE_PATH_ENV: &str = "SATSTORE_BASE_PATH";

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    pub lake_path: PathBuf,
    pub catalog_path: PathBuf,
}

impl StorageConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            lake_path: base_path.join("lake"),
            catalog_path: base_path.join("satcat.sqlite"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseSection {
    pub base_path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IngestSection {
    pub batch_size: usize,
    /// Emit `-1` for unparseable numeric SATCAT fields instead of NULL.
    pub legacy_numeric_sentinel: bool,
    pub archive_raw: bool,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            batch_size: crate::sync::MAX_BATCH_SIZE,
            legacy_numeric_sentinel: false,
            archive_raw: true,
        }
    }
}

impl IngestSection {
    pub fn numeric_fallback(&self) -> NumericFallback {
        if self.legacy_numeric_sentinel {
            NumericFallback::LegacySentinel
        } else {
            NumericFallback::Null
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SourceSection {
    pub url: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub mode: IngestMode,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NetworkSection {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LinksSection {
    pub workers: usize,
    pub launch_delay_ms: u64,
    pub limit: Option<usize>,
}

impl Default for LinksSection {
    fn default() -> Self {
        Self {
            workers: 8,
            launch_delay_ms: 100,
            limit: None,
        }
    }
}

/// Top level configuration file (TOML).
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSection,
    pub ingest: IngestSection,
    pub sources: HashMap<String, SourceSection>,
    pub network: NetworkSection,
    pub links: LinksSection,
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(text).map_err(|e| StorageError::Config(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` when given, otherwise falls back to defaults plus environment.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = AppConfig::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var(BASE_PATH_ENV) {
            if !base.is_empty() {
                self.database.base_path = PathBuf::from(base);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            return Err(StorageError::Config(
                "ingest.batch_size must be at least 1".to_string(),
            ));
        }
        if self.network.max_attempts == 0 {
            return Err(StorageError::Config(
                "network.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.links.workers == 0 {
            return Err(StorageError::Config(
                "links.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig::new(&self.database.base_path)
    }

    pub fn source(&self, name: &str) -> Option<&SourceSection> {
        self.sources.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_paths() {
        let config = StorageConfig::new("/tmp/sat");
        assert_eq!(config.catalog_path, PathBuf::from("/tmp/sat/satcat.sqlite"));
        assert_eq!(config.lake_path, PathBuf::from("/tmp/sat/lake"));
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            [database]
            base_path = "/var/lib/sat"

            [ingest]
            batch_size = 50
            legacy_numeric_sentinel = true

            [sources.satcat]
            url = "https://celestrak.org/pub/satcat.txt"
            table = "celestrak_satcat"

            [sources.ucs]
            url = "https://example.org/ucs.txt"
            mode = "reconcile-by-key"

            [network]
            max_attempts = 5

            [links]
            workers = 4
            limit = 200
        "#;
        let config: AppConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.ingest.batch_size, 50);
        assert!(config.ingest.legacy_numeric_sentinel);
        assert!(config.ingest.archive_raw);
        assert_eq!(config.source("satcat").unwrap().mode, IngestMode::AppendOnly);
        assert_eq!(
            config.source("ucs").unwrap().mode,
            IngestMode::ReconcileByKey
        );
        assert_eq!(config.network.max_attempts, 5);
        assert_eq!(config.network.retry_delay_ms, 500);
        assert_eq!(config.links.limit, Some(200));
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let config: AppConfig = toml::from_str("[ingest]\nbatch_size = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));
    }
}
