use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BundleStore, MetadataStore, StoreError};
use crate::domain::{CacheEntry, EntryStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub removed_failed: usize,
    pub removed_by_ttl: usize,
    pub removed_by_size: usize,
    pub freed_bytes: u64,
}

impl GcStats {
    pub fn removed_total(&self) -> usize {
        self.removed_failed + self.removed_by_ttl + self.removed_by_size
    }
}

/// Cache garbage collection: failed entries age out fast, idle entries age
/// out by TTL, and the total bundle size is held under a ceiling by LRU
/// eviction. Never touches non-terminal entries.
pub struct CacheGc {
    store: Arc<dyn MetadataStore>,
    bundles: Arc<dyn BundleStore>,
    ttl: chrono::Duration,
    failed_ttl: chrono::Duration,
    max_bytes: u64,
}

impl CacheGc {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        bundles: Arc<dyn BundleStore>,
        cache_ttl_days: u64,
        failed_ttl_hours: u64,
        cache_max_bytes: u64,
    ) -> Self {
        Self {
            store,
            bundles,
            ttl: chrono::Duration::days(cache_ttl_days as i64),
            failed_ttl: chrono::Duration::hours(failed_ttl_hours as i64),
            max_bytes: cache_max_bytes,
        }
    }

    pub async fn run_once(&self) -> Result<GcStats, StoreError> {
        let mut stats = GcStats::default();
        let now = Utc::now();

        // Fast path for failures.
        let stale_failed = self
            .store
            .list_stale_entries(now - self.failed_ttl, Some(EntryStatus::Failed))
            .await?;
        for entry in stale_failed {
            stats.freed_bytes += self.remove(&entry).await;
            stats.removed_failed += 1;
        }

        // Idle entries past the TTL.
        let stale = self.store.list_stale_entries(now - self.ttl, None).await?;
        for entry in stale {
            if !entry.status.is_terminal() {
                continue;
            }
            stats.freed_bytes += self.remove(&entry).await;
            stats.removed_by_ttl += 1;
        }

        // LRU size eviction.
        let entries = self.store.list_entries_by_lru().await?;
        let mut sizes = Vec::with_capacity(entries.len());
        let mut total: u64 = 0;
        for entry in &entries {
            let size = self
                .bundles
                .bundle_size(&entry.cache_key, entry.source_type)
                .await;
            total += size;
            sizes.push(size);
        }
        for (entry, size) in entries.iter().zip(sizes) {
            if total <= self.max_bytes {
                break;
            }
            if !entry.status.is_terminal() {
                continue;
            }
            total = total.saturating_sub(size);
            stats.freed_bytes += self.remove(entry).await;
            stats.removed_by_size += 1;
        }

        if stats.removed_total() > 0 {
            tracing::info!(
                removed = stats.removed_total(),
                freed_mb = stats.freed_bytes / (1024 * 1024),
                "Cache GC pass completed"
            );
        }
        Ok(stats)
    }

    async fn remove(&self, entry: &CacheEntry) -> u64 {
        let size = self
            .bundles
            .bundle_size(&entry.cache_key, entry.source_type)
            .await;
        if let Err(e) = self.bundles.delete(&entry.cache_key, entry.source_type).await {
            tracing::warn!(cache_key = %entry.cache_key, error = %e, "GC bundle delete failed");
        }
        if let Err(e) = self.store.delete_entry(&entry.cache_key).await {
            tracing::warn!(cache_key = %entry.cache_key, error = %e, "GC row delete failed");
        }
        size
    }

    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "Cache GC pass failed");
                    }
                }
            }
        }
    }
}
