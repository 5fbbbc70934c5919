use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::BoxStream;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    FileVault, MetadataStore, StoreError, StoredBlob, VaultError,
};
use crate::domain::{FileHash, FileId, FileType, UploadRecord};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload: {0}")]
    InvalidArgument(String),
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("upload timed out")]
    Timeout,
    #[error("too many concurrent uploads")]
    TooManyRequests { retry_after_secs: u64 },
    #[error("file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("storage failed: {0}")]
    Storage(String),
}

impl From<VaultError> for UploadError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::TooLarge { limit } => UploadError::TooLarge { limit },
            VaultError::Empty => UploadError::InvalidArgument("upload body is empty".to_string()),
            VaultError::Timeout(_) => UploadError::Timeout,
            VaultError::Io(e) => UploadError::Storage(e.to_string()),
        }
    }
}

/// Streaming upload store: admission control, type/size gates, content-hash
/// dedup, TTL lifecycle.
///
/// Atomic from the caller's perspective: either a record exists and the file
/// is intact, or neither exists.
pub struct UploadService {
    store: Arc<dyn MetadataStore>,
    vault: Arc<dyn FileVault>,
    admission: Arc<Semaphore>,
    admission_wait: Duration,
    max_file_size: u64,
    grace_bytes: u64,
    ttl: chrono::Duration,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        vault: Arc<dyn FileVault>,
        concurrency: usize,
        admission_wait: Duration,
        max_file_size: u64,
        grace_bytes: u64,
        ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            vault,
            admission: Arc::new(Semaphore::new(concurrency.max(1))),
            admission_wait,
            max_file_size,
            grace_bytes,
            ttl: chrono::Duration::seconds(ttl_secs as i64),
        }
    }

    /// Stream an upload to disk and persist its record.
    pub async fn put(
        &self,
        stream: BoxStream<'_, Result<Bytes, io::Error>>,
        declared_name: &str,
        declared_mime: Option<&str>,
        declared_size: Option<u64>,
    ) -> Result<UploadRecord, UploadError> {
        let safe_name = sanitize_filename(declared_name)
            .ok_or_else(|| UploadError::InvalidArgument("empty or unusable file name".into()))?;

        let ext = extension_of(&safe_name).ok_or_else(|| {
            UploadError::UnsupportedType(format!("no recognizable extension: {}", safe_name))
        })?;
        let file_type = FileType::from_extension(&ext)
            .ok_or_else(|| UploadError::UnsupportedType(format!(".{}", ext)))?;

        let mime_type = declared_mime
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();

        // Declared-length precheck: reject before reading a single byte.
        if let Some(declared) = declared_size {
            if declared > self.max_file_size + self.grace_bytes {
                return Err(UploadError::TooLarge {
                    limit: self.max_file_size,
                });
            }
        }

        let _permit = tokio::time::timeout(self.admission_wait, self.admission.acquire())
            .await
            .map_err(|_| UploadError::TooManyRequests {
                retry_after_secs: self.admission_wait.as_secs().max(1),
            })
            .and_then(|r| {
                r.map_err(|_| UploadError::TooManyRequests {
                    retry_after_secs: self.admission_wait.as_secs().max(1),
                })
            })?;

        let file_id = FileId::generate();
        let blob = self.vault.store_stream(&file_id, &safe_name, stream).await?;
        let size = blob.size;

        // MIME agreement is checked only after the final chunk, so a body
        // that also breaches the size ceiling reports too-large, not
        // unsupported-type.
        if !file_type.accepts_mime(&mime_type) {
            if let Err(e) = self.vault.remove(&blob.path).await {
                tracing::warn!(error = %e, "Failed to unlink upload after MIME rejection");
            }
            return Err(UploadError::UnsupportedType(format!(
                "{} does not match a {} extension",
                mime_type, file_type
            )));
        }

        let now = Utc::now();
        let file_hash = FileHash::parse(&blob.sha256_hex)
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        // Past this point a file exists on disk; every failure path must
        // take it back out so no orphan survives without a record.
        let result: Result<UploadRecord, UploadError> = async {
            let (stored_path, reused) = self.dedup_stored_path(&file_hash, blob).await?;

            let record = UploadRecord {
                file_id: file_id.clone(),
                original_name: declared_name.to_string(),
                size,
                mime_type,
                file_type,
                file_hash: file_hash.clone(),
                stored_path: stored_path.clone(),
                created_at: now,
                expires_at: now + self.ttl,
            };

            match self.store.insert_upload(&record).await {
                Ok(()) => Ok(record),
                Err(e) => {
                    if !reused {
                        if let Err(remove_err) = self.vault.remove(&stored_path).await {
                            tracing::warn!(error = %remove_err, "Failed to unlink upload after store error");
                        }
                    }
                    Err(e.into())
                }
            }
        }
        .await;

        let record = result?;
        tracing::info!(
            file_id = %record.file_id,
            file_type = %record.file_type,
            size = record.size,
            "Upload stored"
        );
        Ok(record)
    }

    /// Reuse an existing stored path when identical content is already
    /// live. Returns whether the returned path belongs to another record.
    async fn dedup_stored_path(
        &self,
        file_hash: &FileHash,
        blob: StoredBlob,
    ) -> Result<(std::path::PathBuf, bool), UploadError> {
        let existing = match self.store.find_live_upload_by_hash(file_hash, Utc::now()).await {
            Ok(existing) => existing,
            Err(e) => {
                if let Err(remove_err) = self.vault.remove(&blob.path).await {
                    tracing::warn!(error = %remove_err, "Failed to unlink upload after store error");
                }
                return Err(e.into());
            }
        };

        if let Some(existing) = existing {
            if existing.stored_path != blob.path
                && tokio::fs::try_exists(&existing.stored_path)
                    .await
                    .unwrap_or(false)
            {
                tracing::debug!(
                    file_hash = %file_hash,
                    reused = %existing.stored_path.display(),
                    "Deduplicated upload by content hash"
                );
                if let Err(e) = self.vault.remove(&blob.path).await {
                    tracing::warn!(error = %e, "Failed to unlink duplicate staging file");
                }
                return Ok((existing.stored_path, true));
            }
        }
        Ok((blob.path, false))
    }

    /// Fetch a record, lazily expiring it when past its TTL or when the
    /// stored file has vanished.
    pub async fn get(&self, file_id: &FileId) -> Result<UploadRecord, UploadError> {
        let record = self
            .store
            .get_upload(file_id)
            .await?
            .ok_or_else(|| UploadError::NotFound(file_id.to_string()))?;

        if record.is_expired(Utc::now()) {
            self.remove(file_id).await?;
            return Err(UploadError::NotFound(file_id.to_string()));
        }

        if !tokio::fs::try_exists(&record.stored_path).await.unwrap_or(false) {
            self.store.delete_upload(file_id).await?;
            return Err(UploadError::NotFound(file_id.to_string()));
        }

        Ok(record)
    }

    /// Resolve a content hash to a live record.
    pub async fn get_by_hash(&self, file_hash: &FileHash) -> Result<UploadRecord, UploadError> {
        self.store
            .find_live_upload_by_hash(file_hash, Utc::now())
            .await?
            .ok_or_else(|| UploadError::NotFound(file_hash.to_string()))
    }

    /// Remove a record; the stored file goes with it only when no other
    /// record shares the path.
    pub async fn remove(&self, file_id: &FileId) -> Result<(), UploadError> {
        let Some(record) = self.store.get_upload(file_id).await? else {
            return Ok(());
        };

        self.store.delete_upload(file_id).await?;

        let remaining = self.store.count_uploads_at_path(&record.stored_path).await?;
        if remaining == 0 {
            self.vault.remove(&record.stored_path).await?;
        }
        Ok(())
    }

    /// Delete every expired record and its now-orphaned content.
    pub async fn reap_expired(&self) -> Result<usize, UploadError> {
        let expired = self.store.list_expired_uploads(Utc::now()).await?;
        let count = expired.len();
        for record in expired {
            if let Err(e) = self.remove(&record.file_id).await {
                tracing::warn!(file_id = %record.file_id, error = %e, "Reaper failed to remove upload");
            }
        }
        if count > 0 {
            tracing::info!(count, "Expired uploads reaped");
        }
        Ok(count)
    }

    /// Background reaper loop; runs until the token is cancelled.
    pub async fn run_reaper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_expired().await {
                        tracing::warn!(error = %e, "Upload reaper pass failed");
                    }
                }
            }
        }
    }
}

/// Strip path components and unsafe characters, trim leading dots, clamp the
/// stem to 200 characters. Returns `None` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .trim_start_matches('.');

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        return None;
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(idx) if idx > 0 => (&cleaned[..idx], &cleaned[idx..]),
        _ => (cleaned.as_str(), ""),
    };

    let clamped: String = stem.chars().take(200).collect();
    Some(format!("{}{}", clamped, ext))
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_control_chars() {
        assert_eq!(
            sanitize_filename("../../etc/passwd.srt").as_deref(),
            Some("passwd.srt")
        );
        assert_eq!(
            sanitize_filename("a\\b\\evil?.mp4").as_deref(),
            Some("evil_.mp4")
        );
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn sanitize_clamps_long_stems_keeping_extension() {
        let long = format!("{}.mp4", "x".repeat(500));
        let safe = sanitize_filename(&long).unwrap();
        assert!(safe.ends_with(".mp4"));
        assert!(safe.chars().count() <= 204);
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of("video.MP4").as_deref(), Some("mp4"));
        assert_eq!(extension_of("noext"), None);
    }
}
