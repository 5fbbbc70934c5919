use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::application::ports::{FileVault, StoredBlob, VaultError};
use crate::domain::FileId;

/// Filesystem vault for uploaded content at `uploads/<file_id>/<safe_name>`.
///
/// Streams the body to disk with a running SHA-256, enforcing the byte
/// ceiling and per-chunk timeouts as it goes. Peak memory stays bounded by
/// the chunk size regardless of upload size.
pub struct FsFileVault {
    root: PathBuf,
    max_bytes: u64,
    chunk_size: usize,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl FsFileVault {
    pub async fn new(
        work_dir: &Path,
        max_bytes: u64,
        chunk_size: usize,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, VaultError> {
        let root = work_dir.join("uploads");
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            max_bytes,
            chunk_size: chunk_size.max(4096),
            read_timeout,
            write_timeout,
        })
    }

    /// Unlink a partial file and its directory; errors here are secondary
    /// to the one being returned.
    async fn cleanup(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to unlink partial upload");
            }
        }
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::remove_dir(parent).await;
        }
    }
}

#[async_trait]
impl FileVault for FsFileVault {
    async fn store_stream(
        &self,
        file_id: &FileId,
        safe_name: &str,
        mut stream: BoxStream<'_, Result<Bytes, io::Error>>,
    ) -> Result<StoredBlob, VaultError> {
        // The service sanitizes names; reject traversal anyway.
        if safe_name.contains(['/', '\\']) || safe_name.contains("..") {
            return Err(VaultError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe file name: {}", safe_name),
            )));
        }

        let dir = self.root.join(file_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(safe_name);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha256::new();
        let mut total: u64 = 0;

        loop {
            let next = match tokio::time::timeout(self.read_timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    drop(file);
                    Self::cleanup(&path).await;
                    return Err(VaultError::Timeout("read"));
                }
            };

            let Some(chunk) = next else { break };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    Self::cleanup(&path).await;
                    return Err(VaultError::Io(e));
                }
            };

            total += chunk.len() as u64;
            if total > self.max_bytes {
                drop(file);
                Self::cleanup(&path).await;
                return Err(VaultError::TooLarge {
                    limit: self.max_bytes,
                });
            }

            hasher.update(&chunk);
            for piece in chunk.chunks(self.chunk_size) {
                match tokio::time::timeout(self.write_timeout, file.write_all(piece)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        drop(file);
                        Self::cleanup(&path).await;
                        return Err(VaultError::Io(e));
                    }
                    Err(_) => {
                        drop(file);
                        Self::cleanup(&path).await;
                        return Err(VaultError::Timeout("write"));
                    }
                }
            }
        }

        if total == 0 {
            drop(file);
            Self::cleanup(&path).await;
            return Err(VaultError::Empty);
        }

        file.sync_all().await?;

        Ok(StoredBlob {
            path,
            size: total,
            sha256_hex: hex::encode(hasher.finalize()),
        })
    }

    async fn remove(&self, stored_path: &Path) -> Result<(), VaultError> {
        match tokio::fs::remove_file(stored_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = stored_path.parent() {
            if parent != self.root {
                let _ = tokio::fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }
}
