use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(
        "Batch {batch} failed to commit after {committed_rows} row(s) were committed: {source}"
    )]
    BatchCommit {
        batch: usize,
        committed_rows: usize,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
