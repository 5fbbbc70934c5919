use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::ports::{
    BundleStore, BundleStoreError, EntryUpdate, GetOrCreateOutcome, MediaProbe, MetadataStore,
    StoreError,
};
use crate::application::services::cache_key::{normalize_url, url_cache_key};
use crate::domain::{CacheEntry, CacheKey, EntryStatus, FileHash, Job, JobId, SourceType};

#[derive(Debug, thiserror::Error)]
pub enum CacheServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bundle(#[from] BundleStoreError),
}

/// Source identity resolved to a cache key.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub cache_key: CacheKey,
    pub source_type: SourceType,
    pub source_ref: String,
    pub source_name: Option<String>,
}

/// Read-only probe result for `/api/cache/lookup`.
#[derive(Debug, Clone)]
pub struct LookupResult {
    pub hit: bool,
    /// `None` when no entry exists for the key.
    pub status: Option<EntryStatus>,
    pub cache_key: CacheKey,
    pub source_name: Option<String>,
    pub summary_text: Option<String>,
    pub bundle_path: Option<String>,
    pub job_id: Option<JobId>,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LookupResult {
    fn miss(cache_key: CacheKey) -> Self {
        Self {
            hit: false,
            status: None,
            cache_key,
            source_name: None,
            summary_text: None,
            bundle_path: None,
            job_id: None,
            error: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Cache coordinator: key computation, validity rules, single-flight entry
/// management, deletion.
pub struct CacheService {
    store: Arc<dyn MetadataStore>,
    bundles: Arc<dyn BundleStore>,
    probe: Arc<dyn MediaProbe>,
    profile_version: String,
    strip_params: Vec<String>,
}

impl CacheService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        bundles: Arc<dyn BundleStore>,
        probe: Arc<dyn MediaProbe>,
        profile_version: String,
        strip_params: Vec<String>,
    ) -> Self {
        Self {
            store,
            bundles,
            probe,
            profile_version,
            strip_params,
        }
    }

    pub fn profile_version(&self) -> &str {
        &self.profile_version
    }

    /// Resolve a URL source: normalize, probe for `(extractor, video_id)`,
    /// derive the key. Probe failures fall back to the normalized URL.
    pub async fn resolve_url(&self, raw_url: &str) -> Result<ResolvedSource, CacheServiceError> {
        let normalized = normalize_url(raw_url, &self.strip_params)
            .map_err(|e| CacheServiceError::InvalidArgument(format!("invalid url: {}", e)))?;

        let (identity, title) = match self.probe.probe(raw_url).await {
            Ok(probe) => {
                let identity = probe
                    .identity()
                    .map(|(e, v)| (e.to_string(), v.to_string()));
                (identity, probe.title)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Probe failed, keying on normalized url");
                (None, None)
            }
        };

        let cache_key = url_cache_key(
            identity.as_ref().map(|(e, v)| (e.as_str(), v.as_str())),
            &normalized,
            &self.profile_version,
        );

        Ok(ResolvedSource {
            cache_key,
            source_type: SourceType::Url,
            source_ref: normalized,
            source_name: title,
        })
    }

    /// Resolve a local source from its content hash.
    pub fn resolve_local(&self, file_hash: &FileHash, source_name: Option<String>) -> ResolvedSource {
        ResolvedSource {
            cache_key: super::cache_key::local_cache_key(file_hash, &self.profile_version),
            source_type: SourceType::Local,
            source_ref: file_hash.to_string(),
            source_name,
        }
    }

    /// Read-only cache probe. `touch` controls the `last_accessed` refresh
    /// so the lookup endpoint can stay side-effect free.
    pub async fn lookup(
        &self,
        source: &ResolvedSource,
        touch: bool,
    ) -> Result<LookupResult, CacheServiceError> {
        let Some(entry) = self.store.get_entry(&source.cache_key).await? else {
            return Ok(LookupResult::miss(source.cache_key.clone()));
        };

        if touch {
            self.store.touch_entry(&source.cache_key).await?;
        }

        let mut result = LookupResult {
            hit: false,
            status: Some(entry.status),
            cache_key: source.cache_key.clone(),
            source_name: entry.source_name.clone(),
            summary_text: None,
            bundle_path: None,
            job_id: None,
            error: entry.error.clone(),
            created_at: Some(entry.created_at),
            updated_at: Some(entry.updated_at),
        };

        match entry.status {
            EntryStatus::Completed => {
                if let Some(reason) = self.demote_if_invalid(&entry).await? {
                    result.status = Some(EntryStatus::Failed);
                    result.error = Some(reason);
                    return Ok(result);
                }
                result.hit = true;
                result.summary_text = entry.summary_text;
                result.bundle_path = entry.bundle_path;
            }
            EntryStatus::Pending | EntryStatus::Running => {
                result.job_id = self
                    .store
                    .latest_job_for(&source.cache_key)
                    .await?
                    .map(|j| j.job_id);
            }
            EntryStatus::Failed => {}
        }
        Ok(result)
    }

    /// The get-or-create step: validate completed bundles first
    /// (demoting broken ones), then run the transactional state transition.
    pub async fn get_or_create(
        &self,
        source: &ResolvedSource,
        refresh: bool,
    ) -> Result<GetOrCreateOutcome, CacheServiceError> {
        if !refresh {
            if let Some(entry) = self.store.get_entry(&source.cache_key).await? {
                if entry.status == EntryStatus::Completed {
                    self.demote_if_invalid(&entry).await?;
                }
            }
        }

        let outcome = self
            .store
            .get_or_create(
                &source.cache_key,
                source.source_type,
                &source.source_ref,
                source.source_name.as_deref(),
                &self.profile_version,
                refresh,
            )
            .await?;

        if matches!(outcome, GetOrCreateOutcome::Hit(_)) {
            self.store.touch_entry(&source.cache_key).await?;
        }
        Ok(outcome)
    }

    /// A completed entry with a broken bundle is not a hit; flip it to
    /// `failed` with the validation reason so the caller can refresh.
    async fn demote_if_invalid(
        &self,
        entry: &CacheEntry,
    ) -> Result<Option<String>, CacheServiceError> {
        let summary_ok = entry
            .summary_text
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);

        let reason = if !summary_ok {
            Some("summary_text_invalid".to_string())
        } else if entry.profile_version != self.profile_version {
            Some("profile_version_mismatch".to_string())
        } else {
            match self
                .bundles
                .validate(&entry.cache_key, entry.source_type, &self.profile_version)
                .await
            {
                Ok(()) => None,
                Err(invalid) => Some(invalid.as_str().to_string()),
            }
        };

        if let Some(reason) = &reason {
            tracing::warn!(
                cache_key = %entry.cache_key,
                reason = %reason,
                "Demoting completed entry with invalid bundle"
            );
            self.store
                .update_entry(
                    &entry.cache_key,
                    EntryUpdate {
                        status: Some(EntryStatus::Failed),
                        error: Some(reason.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(reason)
    }

    pub async fn get_entry(
        &self,
        cache_key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheServiceError> {
        Ok(self.store.get_entry(cache_key).await?)
    }

    /// Job view joined with its cache entry, for status polling.
    pub async fn get_job(
        &self,
        job_id: &JobId,
    ) -> Result<Option<(Job, Option<CacheEntry>)>, CacheServiceError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            return Ok(None);
        };
        let entry = self.store.get_entry(&job.cache_key).await?;
        Ok(Some((job, entry)))
    }

    /// Remove the entry, its jobs, and its bundle directory. Future
    /// requests with the same key re-create from scratch.
    pub async fn delete(&self, cache_key: &CacheKey) -> Result<bool, CacheServiceError> {
        let Some(entry) = self.store.get_entry(cache_key).await? else {
            return Ok(false);
        };

        self.bundles.delete(cache_key, entry.source_type).await?;
        let existed = self.store.delete_entry(cache_key).await?;

        tracing::info!(cache_key = %cache_key, "Cache entry deleted");
        Ok(existed)
    }
}
