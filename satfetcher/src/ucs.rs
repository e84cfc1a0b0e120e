use async_trait::async_trait;
use satstore::{
    errors::Result as StorageResult,
    fetch::{FetchResponse, Fetcher},
    schema_registry::{SchemaDescriptor, UCS},
};

use crate::http::HttpSource;

pub const UCS_URL: &str = "https://s3.amazonaws.com/ucs-documents/nuclear-weapons/sat-database/5-9-19-update/UCS_Satellite_Database_4-1-2019.txt";

/// Downloads the tab delimited UCS satellite database export.
pub struct UcsFetcher {
    http: HttpSource,
    url: String,
}

impl UcsFetcher {
    pub const NAME: &'static str = "ucs";

    pub fn new(http: HttpSource) -> Self {
        Self::with_url(http, UCS_URL)
    }

    pub fn with_url(http: HttpSource, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Fetcher for UcsFetcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &'static SchemaDescriptor {
        &UCS
    }

    async fn fetch(&self) -> StorageResult<FetchResponse> {
        let bytes = self.http.get_bytes(&self.url).await?;
        Ok(FetchResponse {
            bytes,
            source_url: self.url.clone(),
        })
    }
}
