use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domain::FileId;

/// Result of streaming a body to disk.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub path: PathBuf,
    pub size: u64,
    pub sha256_hex: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Running byte count exceeded the configured ceiling; the partial file
    /// was unlinked before returning.
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("upload body is empty")]
    Empty,
    #[error("chunk {0} timed out")]
    Timeout(&'static str),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Streaming writer for uploaded content under `uploads/<file_id>/<name>`.
///
/// Writes chunk-by-chunk with a running SHA-256; never buffers the body.
/// Every failure path unlinks the partial file, so a returned error means
/// nothing was persisted.
#[async_trait]
pub trait FileVault: Send + Sync {
    async fn store_stream(
        &self,
        file_id: &FileId,
        safe_name: &str,
        stream: BoxStream<'_, Result<Bytes, io::Error>>,
    ) -> Result<StoredBlob, VaultError>;

    /// Remove a stored file and its per-id directory if now empty.
    async fn remove(&self, stored_path: &Path) -> Result<(), VaultError>;
}
