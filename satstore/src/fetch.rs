use crate::errors::Result;
use crate::models::IngestMode;
use crate::schema_registry::SchemaDescriptor;
use async_trait::async_trait;

/// Raw bytes of one source file as delivered by a fetcher.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub bytes: Vec<u8>,
    /// Where the bytes came from, recorded in the run log.
    pub source_url: String,
}

/// Parameters of one synchronization run.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Target table, the schema's default table when `None`.
    pub table: Option<String>,
    pub mode: IngestMode,
}

impl SyncRequest {
    pub fn new(mode: IngestMode) -> Self {
        Self { table: None, mode }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// A source of raw catalog files.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// The record layout of the files this fetcher delivers.
    fn schema(&self) -> &'static SchemaDescriptor;

    async fn fetch(&self) -> Result<FetchResponse>;
}
