use crate::config::StorageConfig;
use crate::errors::Result;
use crate::utils::fingerprint::{Fingerprint, fingerprint};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Archive of raw source files, keyed by content fingerprint.
pub struct Lake {
    config: StorageConfig,
}

impl Lake {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(config.lake_path.join("bronze")).await?;
        Ok(Self { config })
    }

    pub fn bronze_path(&self, source: &str, file_fingerprint: &Fingerprint) -> PathBuf {
        self.config
            .lake_path
            .join("bronze")
            .join(source)
            .join(format!("{file_fingerprint}.txt"))
    }

    /// Stores `bytes` under `bronze/<source>/<fingerprint>.txt`. Content that is
    /// already archived is not written again.
    pub async fn archive(&self, source: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.bronze_path(source, &fingerprint(bytes));
        if tokio::fs::try_exists(&path).await? {
            log::debug!("Raw file already archived at {}", path.display());
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        log::info!("Archived {} bytes of '{}' to {}", bytes.len(), source, path.display());
        Ok(path)
    }
}
