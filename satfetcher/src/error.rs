use satstore::errors::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("giving up on {url} after {attempts} attempt(s): {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

pub type Result<T> = std::result::Result<T, FetchError>;

impl From<FetchError> for StorageError {
    fn from(err: FetchError) -> Self {
        StorageError::Other(anyhow::Error::new(err))
    }
}
