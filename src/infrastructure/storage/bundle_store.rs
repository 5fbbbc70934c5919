use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::application::ports::{BundleInvalid, BundleStore, BundleStoreError};
use crate::domain::{ArtifactInfo, BundleManifest, CacheKey, EntryStatus, JobId, SourceType, SummaryDocument};

const MANIFEST_NAME: &str = "bundle.json";
const HASH_BUF_SIZE: usize = 1024 * 1024;

/// Filesystem bundle store.
///
/// Layout under the work dir: `cache/{url|local}/<cache_key>/…` for committed
/// bundles, `tmp/<job_id>/…` for staging. Promotion is a manifest write, an
/// fsync, and one rename.
pub struct FsBundleStore {
    cache_root: PathBuf,
    tmp_root: PathBuf,
}

impl FsBundleStore {
    pub async fn new(work_dir: &Path) -> Result<Self, BundleStoreError> {
        let cache_root = work_dir.join("cache");
        let tmp_root = work_dir.join("tmp");
        tokio::fs::create_dir_all(&cache_root).await?;
        tokio::fs::create_dir_all(&tmp_root).await?;
        Ok(Self {
            cache_root,
            tmp_root,
        })
    }

    pub fn staging_dir(&self, job_id: &JobId) -> PathBuf {
        self.tmp_root.join(job_id.as_str())
    }

    async fn sha256_of(path: &Path) -> Result<String, BundleStoreError> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_BUF_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Canonical artifact files present in a directory: `video.*`,
    /// `audio.wav`, `subtitle.*`, `asr.json`, `summary.json`.
    async fn artifact_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, BundleStoreError> {
        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = match name.as_str() {
                "asr.json" => Some("asr"),
                "summary.json" => Some("summary"),
                other if other.starts_with("video.") => Some("video"),
                other if other.starts_with("audio.") => Some("audio"),
                other if other.starts_with("subtitle.") => Some("subtitle"),
                _ => None,
            };
            if let Some(key) = key {
                found.push((key.to_string(), entry.path()));
            }
        }
        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl BundleStore for FsBundleStore {
    async fn stage(&self, job_id: &JobId) -> Result<PathBuf, BundleStoreError> {
        let dir = self.staging_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn scan_artifacts(
        &self,
        job_id: &JobId,
    ) -> Result<BTreeMap<String, ArtifactInfo>, BundleStoreError> {
        let dir = self.staging_dir(job_id);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(BundleStoreError::StagingMissing(job_id.to_string()));
        }

        let mut artifacts = BTreeMap::new();
        for (key, path) in Self::artifact_files(&dir).await? {
            let size = tokio::fs::metadata(&path).await?.len();
            let sha256 = Self::sha256_of(&path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            artifacts.insert(
                key,
                ArtifactInfo {
                    path: file_name,
                    size,
                    sha256,
                },
            );
        }
        Ok(artifacts)
    }

    async fn promote(
        &self,
        job_id: &JobId,
        cache_key: &CacheKey,
        source_type: SourceType,
        manifest: &BundleManifest,
    ) -> Result<PathBuf, BundleStoreError> {
        let staging = self.staging_dir(job_id);
        if !tokio::fs::try_exists(&staging).await? {
            return Err(BundleStoreError::StagingMissing(job_id.to_string()));
        }

        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| BundleStoreError::Manifest(e.to_string()))?;
        let manifest_path = staging.join(MANIFEST_NAME);
        {
            let mut file = tokio::fs::File::create(&manifest_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
        }

        let final_dir = self.bundle_dir(cache_key, source_type);
        if let Some(parent) = final_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Refresh path: clear the previous bundle so the rename lands clean.
        if tokio::fs::try_exists(&final_dir).await? {
            tokio::fs::remove_dir_all(&final_dir).await?;
        }

        tokio::fs::rename(&staging, &final_dir)
            .await
            .map_err(|e| BundleStoreError::PromoteFailed(e.to_string()))?;

        tracing::info!(cache_key = %cache_key, bundle = %final_dir.display(), "Bundle promoted");
        Ok(final_dir)
    }

    async fn discard(&self, job_id: &JobId) -> Result<(), BundleStoreError> {
        let dir = self.staging_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(job_id = %job_id, "Staging already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn validate(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
        profile_version: &str,
    ) -> Result<(), BundleInvalid> {
        let dir = self.bundle_dir(cache_key, source_type);
        let manifest_path = dir.join(MANIFEST_NAME);

        let raw = tokio::fs::read(&manifest_path)
            .await
            .map_err(|_| BundleInvalid::MissingManifest)?;
        let manifest: BundleManifest =
            serde_json::from_slice(&raw).map_err(|_| BundleInvalid::ManifestUnreadable)?;

        if manifest.profile_version != profile_version {
            return Err(BundleInvalid::ProfileVersionMismatch);
        }
        if manifest.status != EntryStatus::Completed {
            return Err(BundleInvalid::StatusNotCompleted);
        }
        let manifest_summary = manifest
            .summary_text
            .as_deref()
            .map(str::trim)
            .unwrap_or("");
        if manifest_summary.is_empty() {
            return Err(BundleInvalid::EmptySummary);
        }

        for artifact in manifest.artifacts.values() {
            let path = dir.join(&artifact.path);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(BundleInvalid::MissingArtifact);
            }
        }

        let summary_raw = tokio::fs::read(dir.join("summary.json"))
            .await
            .map_err(|_| BundleInvalid::SummaryJsonInvalid)?;
        let summary: SummaryDocument =
            serde_json::from_slice(&summary_raw).map_err(|_| BundleInvalid::SummaryJsonInvalid)?;
        if summary.profile_version != profile_version {
            return Err(BundleInvalid::ProfileVersionMismatch);
        }
        if summary.summary_text.trim() != manifest_summary {
            return Err(BundleInvalid::SummaryTextMismatch);
        }

        Ok(())
    }

    async fn load_manifest(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
    ) -> Option<BundleManifest> {
        let path = self.bundle_dir(cache_key, source_type).join(MANIFEST_NAME);
        let raw = tokio::fs::read(&path).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    fn bundle_dir(&self, cache_key: &CacheKey, source_type: SourceType) -> PathBuf {
        self.cache_root
            .join(source_type.as_str())
            .join(cache_key.as_str())
    }

    async fn bundle_size(&self, cache_key: &CacheKey, source_type: SourceType) -> u64 {
        let mut total = 0u64;
        let mut stack = vec![self.bundle_dir(cache_key, source_type)];
        while let Some(dir) = stack.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if let Ok(meta) = entry.metadata().await {
                    total += meta.len();
                }
            }
        }
        total
    }

    async fn delete(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
    ) -> Result<bool, BundleStoreError> {
        let dir = self.bundle_dir(cache_key, source_type);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
