pub mod catalog;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod lake;
pub mod models;
pub mod normalize;
pub mod schema_registry;
pub mod sync;
pub mod utils;

use crate::catalog::Catalog;
use crate::config::{AppConfig, IngestSection, StorageConfig};
use crate::errors::{Result, StorageError};
use crate::fetch::{Fetcher, SyncRequest};
use crate::lake::Lake;
use crate::models::{IngestMode, IngestReport};
use crate::schema_registry::SchemaDescriptor;
use crate::sync::IngestEngine;
use crate::utils::fingerprint::fingerprint;
use std::collections::HashMap;
use std::sync::Arc;

/// The main entry point for the `satstore` library.
///
/// `SatStore` ties the pieces of the ingestion pipeline together:
/// - A SQLite `Catalog` holding the catalog tables, the import run log and link checker output.
/// - A `Lake` archiving every raw source file by content fingerprint.
/// - The registered `Fetcher`s that deliver raw SATCAT / UCS files.
///
/// # Example
///
/// ```rust,no_run
/// use satstore::{SatStore, config::StorageConfig, models::IngestMode, schema_registry::SATCAT};
/// use tempfile::tempdir;
///
/// #[tokio::main]
/// async fn main() {
///     let dir = tempdir().unwrap();
///     let store = SatStore::new(StorageConfig::new(dir.path())).await.unwrap();
///     let report = store
///         .ingest_bytes(&SATCAT, None, IngestMode::AppendOnly, b"")
///         .await
///         .unwrap();
///     assert_eq!(report.inserted, 0);
/// }
/// ```
pub struct SatStore {
    pub config: StorageConfig,
    pub ingest: IngestSection,
    pub catalog: Arc<Catalog>,
    pub lake: Arc<Lake>,
    fetchers: HashMap<&'static str, Arc<dyn Fetcher>>,
}

impl SatStore {
    /// Opens the catalog (creating its bookkeeping tables) and the raw archive.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let catalog = Arc::new(Catalog::new(&config)?);
        catalog.initialize_schema()?;
        let lake = Arc::new(Lake::new(config.clone()).await?);

        Ok(Self {
            config,
            ingest: IngestSection::default(),
            catalog,
            lake,
            fetchers: HashMap::new(),
        })
    }

    pub async fn from_app_config(app: &AppConfig) -> Result<Self> {
        let mut store = Self::new(app.storage()).await?;
        store.ingest = app.ingest.clone();
        Ok(store)
    }

    pub fn register_fetcher(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(fetcher.name(), fetcher);
    }

    pub fn fetcher_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.fetchers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Fetches the current file through the named fetcher and ingests it.
    pub async fn sync(&self, fetcher_name: &str, request: SyncRequest) -> Result<IngestReport> {
        let fetcher = self.fetchers.get(fetcher_name).ok_or_else(|| {
            StorageError::Config(format!("Fetcher '{}' not registered.", fetcher_name))
        })?;
        let schema = fetcher.schema();

        log::info!("Fetching '{}'", fetcher_name);
        let response = fetcher.fetch().await?;
        log::info!(
            "Fetched {} bytes from {}",
            response.bytes.len(),
            response.source_url
        );

        self.run_ingest(
            fetcher_name,
            schema,
            request.table.as_deref(),
            request.mode,
            &response.bytes,
        )
        .await
    }

    /// Ingests a local copy of a source file.
    pub async fn ingest_bytes(
        &self,
        schema: &'static SchemaDescriptor,
        table: Option<&str>,
        mode: IngestMode,
        bytes: &[u8],
    ) -> Result<IngestReport> {
        self.run_ingest(schema.name, schema, table, mode, bytes).await
    }

    async fn run_ingest(
        &self,
        source: &str,
        schema: &'static SchemaDescriptor,
        table: Option<&str>,
        mode: IngestMode,
        bytes: &[u8],
    ) -> Result<IngestReport> {
        let table = table.unwrap_or(schema.default_table);
        let file_fingerprint = fingerprint(bytes);

        if self.ingest.archive_raw {
            self.lake.archive(source, bytes).await?;
        }

        let run_id = self.catalog.create_run_log(
            source,
            table,
            mode.as_str(),
            Some(&file_fingerprint),
        )?;

        let records = schema.parse(bytes, self.ingest.numeric_fallback());
        let engine = IngestEngine::new(self.catalog.as_ref(), schema, table)
            .with_batch_size(self.ingest.batch_size);

        match engine.ingest(records, mode) {
            Ok(report) => {
                let details = serde_json::to_string(&report)?;
                self.catalog.finish_run_log(run_id, "SUCCESS", &details)?;
                Ok(report)
            }
            Err(e) => {
                log::error!("Ingest of '{}' into '{}' failed: {}", source, table, e);
                self.catalog
                    .finish_run_log(run_id, "FAILED", &e.to_string())?;
                Err(e)
            }
        }
    }
}
