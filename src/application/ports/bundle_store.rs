use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{ArtifactInfo, BundleManifest, CacheKey, JobId, SourceType};

/// Why a bundle failed validation. Recorded as the entry error when a
/// `completed` entry is demoted at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleInvalid {
    MissingManifest,
    ManifestUnreadable,
    ProfileVersionMismatch,
    StatusNotCompleted,
    EmptySummary,
    MissingArtifact,
    SummaryJsonInvalid,
    SummaryTextMismatch,
}

impl BundleInvalid {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleInvalid::MissingManifest => "bundle_manifest_missing",
            BundleInvalid::ManifestUnreadable => "bundle_manifest_unreadable",
            BundleInvalid::ProfileVersionMismatch => "profile_version_mismatch",
            BundleInvalid::StatusNotCompleted => "bundle_status_invalid",
            BundleInvalid::EmptySummary => "summary_text_invalid",
            BundleInvalid::MissingArtifact => "bundle_artifact_missing",
            BundleInvalid::SummaryJsonInvalid => "summary_json_invalid",
            BundleInvalid::SummaryTextMismatch => "summary_text_mismatch",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BundleStoreError {
    #[error("staging directory missing for job {0}")]
    StagingMissing(String),
    #[error("promote failed: {0}")]
    PromoteFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest serialization: {0}")]
    Manifest(String),
}

/// Owns the on-disk artifact layout and the atomic "staged → cached"
/// transition.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Create (idempotently) and return the staging directory for a job.
    async fn stage(&self, job_id: &JobId) -> Result<PathBuf, BundleStoreError>;

    /// Scan the staging directory for the canonical artifact files and
    /// return their manifest records (size + sha256).
    async fn scan_artifacts(
        &self,
        job_id: &JobId,
    ) -> Result<BTreeMap<String, ArtifactInfo>, BundleStoreError>;

    /// Write `bundle.json` (fsynced) into staging, then rename the staging
    /// directory to its final bundle path in one filesystem operation. A
    /// pre-existing bundle at the final path is removed first (refresh).
    async fn promote(
        &self,
        job_id: &JobId,
        cache_key: &CacheKey,
        source_type: SourceType,
        manifest: &BundleManifest,
    ) -> Result<PathBuf, BundleStoreError>;

    /// Remove the staging directory recursively. Already-gone staging is
    /// logged, not an error.
    async fn discard(&self, job_id: &JobId) -> Result<(), BundleStoreError>;

    /// Check the committed bundle against the validity rules. `Ok(())`
    /// means the entry may be served as a hit.
    async fn validate(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
        profile_version: &str,
    ) -> Result<(), BundleInvalid>;

    async fn load_manifest(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
    ) -> Option<BundleManifest>;

    /// Final bundle directory path for a key (whether or not it exists yet).
    fn bundle_dir(&self, cache_key: &CacheKey, source_type: SourceType) -> PathBuf;

    /// Recursive byte count of a committed bundle; 0 when absent.
    async fn bundle_size(&self, cache_key: &CacheKey, source_type: SourceType) -> u64;

    /// Remove a committed bundle. Returns whether anything was deleted.
    async fn delete(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
    ) -> Result<bool, BundleStoreError>;
}
