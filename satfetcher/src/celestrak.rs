use async_trait::async_trait;
use satstore::{
    errors::Result as StorageResult,
    fetch::{FetchResponse, Fetcher},
    schema_registry::{SATCAT, SchemaDescriptor},
};

use crate::http::HttpSource;

pub const SATCAT_URL: &str = "https://celestrak.org/pub/satcat.txt";

/// Downloads the fixed width Celestrak SATCAT.
pub struct CelestrakFetcher {
    http: HttpSource,
    url: String,
}

impl CelestrakFetcher {
    pub const NAME: &'static str = "satcat";

    pub fn new(http: HttpSource) -> Self {
        Self::with_url(http, SATCAT_URL)
    }

    pub fn with_url(http: HttpSource, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Fetcher for CelestrakFetcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn schema(&self) -> &'static SchemaDescriptor {
        &SATCAT
    }

    async fn fetch(&self) -> StorageResult<FetchResponse> {
        let bytes = self.http.get_bytes(&self.url).await?;
        Ok(FetchResponse {
            bytes,
            source_url: self.url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::serve;
    use satstore::config::NetworkSection;

    #[tokio::test]
    async fn test_fetch_satcat_file() {
        let (addr, _) = serve(|path, _| {
            assert_eq!(path, "/pub/satcat.txt");
            (200, "1957-001A    00001\n".to_string())
        })
        .await;
        let http = HttpSource::new(&NetworkSection::default()).unwrap();
        let fetcher = CelestrakFetcher::with_url(http, format!("http://{addr}/pub/satcat.txt"));

        assert_eq!(fetcher.name(), "satcat");
        assert_eq!(fetcher.schema().natural_key, "norad_num");
        let response = fetcher.fetch().await.unwrap();
        assert_eq!(response.bytes, b"1957-001A    00001\n");
        assert!(response.source_url.ends_with("/pub/satcat.txt"));
    }
}
