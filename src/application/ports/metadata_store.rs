use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CacheEntry, CacheKey, EntryStatus, FileHash, FileId, Job, JobId, JobStatus, SourceType,
    UploadRecord,
};

use super::StoreError;

/// Partial update of a cache entry. `None` fields are left untouched;
/// `updated_at` always advances.
#[derive(Debug, Default, Clone)]
pub struct EntryUpdate {
    pub status: Option<EntryStatus>,
    pub summary_text: Option<String>,
    pub bundle_path: Option<String>,
    pub error: Option<String>,
    pub source_name: Option<String>,
}

/// Result of the transactional get-or-create step.
#[derive(Debug)]
pub enum GetOrCreateOutcome {
    /// Entry is `completed`; the caller already validated the bundle.
    Hit(CacheEntry),
    /// Entry is `pending` or `running`; the existing job is adopted and no
    /// new job is created.
    InFlight { entry: CacheEntry, job: Job },
    /// A fresh job was created (new entry, or a terminal entry reset by
    /// `refresh`). The caller must enqueue the job exactly once.
    Enqueue { entry: CacheEntry, job: Job },
    /// Entry is `failed` and `refresh` was not requested.
    Failed(CacheEntry),
}

/// Single source of truth for uploads, cache entries, and jobs.
///
/// Implementations serialize writers; `get_or_create` must run as one
/// transaction so that concurrent requests for the same key never both
/// create a job.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // --- uploads ---

    async fn insert_upload(&self, record: &UploadRecord) -> Result<(), StoreError>;

    async fn get_upload(&self, file_id: &FileId) -> Result<Option<UploadRecord>, StoreError>;

    /// Most recent non-expired record with this content hash, if any.
    async fn find_live_upload_by_hash(
        &self,
        file_hash: &FileHash,
        now: DateTime<Utc>,
    ) -> Result<Option<UploadRecord>, StoreError>;

    async fn delete_upload(&self, file_id: &FileId) -> Result<(), StoreError>;

    /// How many upload records still point at `stored_path`. Shared content
    /// is unlinked only when this drops to zero.
    async fn count_uploads_at_path(&self, stored_path: &Path) -> Result<u64, StoreError>;

    async fn list_expired_uploads(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<UploadRecord>, StoreError>;

    // --- cache entries ---

    async fn get_entry(&self, cache_key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// The single-flight step. Reads the entry for `cache_key` and, in the
    /// same transaction, creates or adopts work per the entry state machine.
    async fn get_or_create(
        &self,
        cache_key: &CacheKey,
        source_type: SourceType,
        source_ref: &str,
        source_name: Option<&str>,
        profile_version: &str,
        refresh: bool,
    ) -> Result<GetOrCreateOutcome, StoreError>;

    async fn update_entry(
        &self,
        cache_key: &CacheKey,
        update: EntryUpdate,
    ) -> Result<(), StoreError>;

    /// Refresh `last_accessed` for LRU eviction.
    async fn touch_entry(&self, cache_key: &CacheKey) -> Result<(), StoreError>;

    /// Remove the entry and cascade to its jobs. Returns whether a row
    /// existed.
    async fn delete_entry(&self, cache_key: &CacheKey) -> Result<bool, StoreError>;

    /// Entries idle past `cutoff` by `COALESCE(last_accessed, updated_at)`,
    /// oldest first, optionally filtered by status.
    async fn list_stale_entries(
        &self,
        cutoff: DateTime<Utc>,
        status: Option<EntryStatus>,
    ) -> Result<Vec<CacheEntry>, StoreError>;

    /// Completed entries ordered least-recently-accessed first, for size
    /// eviction.
    async fn list_entries_by_lru(&self) -> Result<Vec<CacheEntry>, StoreError>;

    // --- jobs ---

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Newest job for a cache key, regardless of status.
    async fn latest_job_for(&self, cache_key: &CacheKey) -> Result<Option<Job>, StoreError>;

    async fn update_job(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Startup sweep: move every non-terminal job (and its entry) to
    /// `failed` with reason `interrupted`. Returns the affected job ids so
    /// the caller can discard their staging directories.
    async fn sweep_interrupted(&self) -> Result<Vec<JobId>, StoreError>;
}
