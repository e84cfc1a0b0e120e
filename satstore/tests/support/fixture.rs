//! Test doubles for the ingestion pipeline.
//!
//! `FixtureFetcher` serves whatever bytes the test puts into it so that a full
//! `SatStore::sync` can run without network access. `FailingStore` wraps a real
//! catalog, records the size of every submitted batch and can be told to fail a
//! given batch.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use satstore::{
    catalog::{Catalog, Predicate, TableStore, WriteBatch},
    errors::{Result as StorageResult, StorageError},
    fetch::{FetchResponse, Fetcher},
    models::StoredRow,
    schema_registry::SchemaDescriptor,
};
use tokio::sync::Mutex as AsyncMutex;

pub struct FixtureFetcher {
    schema: &'static SchemaDescriptor,
    payload: AsyncMutex<Vec<u8>>,
}

#[allow(dead_code)]
impl FixtureFetcher {
    pub const NAME: &'static str = "fixture_fetcher";

    pub fn new(schema: &'static SchemaDescriptor, payload: Vec<u8>) -> Self {
        Self {
            schema,
            payload: AsyncMutex::new(payload),
        }
    }

    pub async fn set_payload(&self, payload: Vec<u8>) {
        *self.payload.lock().await = payload;
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &'static SchemaDescriptor {
        self.schema
    }

    async fn fetch(&self) -> StorageResult<FetchResponse> {
        Ok(FetchResponse {
            bytes: self.payload.lock().await.clone(),
            source_url: "fixture://memory".to_string(),
        })
    }
}

pub struct FailingStore {
    inner: Catalog,
    fail_at: Option<usize>,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(inner: Catalog) -> Self {
        Self {
            inner,
            fail_at: None,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Fail the `index`-th (0-based) call to `execute_batch`.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl TableStore for FailingStore {
    fn table_exists(&self, table: &str) -> StorageResult<bool> {
        self.inner.table_exists(table)
    }

    fn create_table(&self, schema: &SchemaDescriptor, table: &str) -> StorageResult<()> {
        self.inner.create_table(schema, table)
    }

    fn find_all(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        predicate: &Predicate,
    ) -> StorageResult<Vec<StoredRow>> {
        self.inner.find_all(schema, table, predicate)
    }

    fn execute_batch(
        &self,
        schema: &SchemaDescriptor,
        table: &str,
        batch: &WriteBatch,
    ) -> StorageResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(batch.len());
        if self.fail_at == Some(call) {
            return Err(StorageError::StoreUnavailable(format!(
                "injected failure on batch {call}"
            )));
        }
        self.inner.execute_batch(schema, table, batch)
    }

    fn count_rows(&self, table: &str) -> StorageResult<i64> {
        self.inner.count_rows(table)
    }
}
