use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::application::ports::{
    BundleStore, EntryUpdate, MetadataStore, StoreError,
};
use crate::application::services::job_queue::{CancelRegistry, JobDequeue, JobQueue};
use crate::application::services::pipeline::{Pipeline, PipelineError, StageContext};
use crate::domain::{
    BundleManifest, CacheEntry, EntryStatus, FileHash, Job, JobId, JobStatus, SourceType,
    BUNDLE_FORMAT_VERSION,
};

/// Worker pool executing the fixed pipeline for queued jobs.
///
/// Each worker loops: dequeue, mark running, run the branch for the source
/// kind into staging, then either promote the staged bundle and complete the
/// entry, or discard staging and fail it. Errors never kill the worker.
pub struct SummaryWorker {
    store: Arc<dyn MetadataStore>,
    bundles: Arc<dyn BundleStore>,
    pipeline: Arc<Pipeline>,
    queue: Arc<JobQueue>,
    dequeue: Arc<JobDequeue>,
    cancels: Arc<CancelRegistry>,
    shutdown: CancellationToken,
    profile_version: String,
}

impl SummaryWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MetadataStore>,
        bundles: Arc<dyn BundleStore>,
        pipeline: Arc<Pipeline>,
        queue: Arc<JobQueue>,
        dequeue: Arc<JobDequeue>,
        cancels: Arc<CancelRegistry>,
        shutdown: CancellationToken,
        profile_version: String,
    ) -> Self {
        Self {
            store,
            bundles,
            pipeline,
            queue,
            dequeue,
            cancels,
            shutdown,
            profile_version,
        }
    }

    /// Spawn exactly `count` workers; zero disables processing entirely.
    pub fn spawn_pool(worker: Arc<Self>, count: usize) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|idx| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    tracing::info!(worker = idx, "Summary worker started");
                    worker.run().await;
                    tracing::info!(worker = idx, "Summary worker stopped");
                })
            })
            .collect()
    }

    async fn run(&self) {
        loop {
            let job_id = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                job_id = self.dequeue.recv() => job_id,
            };
            let Some(job_id) = job_id else { break };

            // Capacity just freed; pull parked jobs into the channel.
            self.queue.drain_overflow();

            let span = tracing::info_span!("summary_job", job_id = %job_id);
            if let Err(e) = self.process(&job_id).instrument(span).await {
                tracing::error!(error = %e, "Job bookkeeping failed");
            }

            self.queue.drain_overflow();
        }
    }

    async fn process(&self, job_id: &JobId) -> Result<(), StoreError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            tracing::warn!("Dequeued unknown job");
            return Ok(());
        };
        if job.status.is_terminal() {
            // Swept or deleted while parked in the queue.
            tracing::debug!(status = %job.status, "Skipping terminal job");
            return Ok(());
        }

        let Some(entry) = self.store.get_entry(&job.cache_key).await? else {
            self.store
                .update_job(job_id, JobStatus::Failed, Some("internal: cache entry missing"))
                .await?;
            return Ok(());
        };

        let cancel = self.cancels.register(&job.cache_key);

        self.store
            .update_entry(
                &job.cache_key,
                EntryUpdate {
                    status: Some(EntryStatus::Running),
                    ..Default::default()
                },
            )
            .await?;
        self.store
            .update_job(job_id, JobStatus::Running, None)
            .await?;

        let outcome = self.execute(&job, &entry, &cancel).await;

        match outcome {
            Ok(ctx) => {
                match self.commit(&job, &entry, &ctx).await {
                    Ok(bundle_path) => {
                        tracing::info!(bundle = %bundle_path, "Summary job completed");
                    }
                    Err(e) => {
                        let message = format!("internal: {}", e);
                        self.fail(&job, &message).await?;
                    }
                }
            }
            Err(e) => {
                let message = format!("{}: {}", e.kind(), e);
                tracing::warn!(error = %message, "Summary job failed");
                self.fail(&job, &message).await?;
            }
        }

        self.cancels.release(&job.cache_key);
        Ok(())
    }

    async fn execute(
        &self,
        job: &Job,
        entry: &CacheEntry,
        cancel: &CancellationToken,
    ) -> Result<StageContext, PipelineError> {
        let staging = self
            .bundles
            .stage(&job.job_id)
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;

        let mut ctx = StageContext::new(
            job.job_id.clone(),
            job.cache_key.clone(),
            entry.source_type,
            staging,
        );
        ctx.source_name = entry.source_name.clone();

        match entry.source_type {
            SourceType::Url => {
                ctx.source_url = Some(entry.source_ref.clone());
                self.pipeline.run_url(ctx, cancel).await
            }
            SourceType::Local => {
                let file_hash = FileHash::parse(&entry.source_ref).map_err(|_| {
                    PipelineError::UnsupportedInput(format!(
                        "local entry with non-hash source_ref: {}",
                        entry.source_ref
                    ))
                })?;
                let record = self
                    .store
                    .find_live_upload_by_hash(&file_hash, Utc::now())
                    .await
                    .map_err(|e| PipelineError::UnsupportedInput(e.to_string()))?
                    .ok_or_else(|| {
                        PipelineError::UnsupportedInput(
                            "uploaded file expired or missing".to_string(),
                        )
                    })?;

                if ctx.source_name.is_none() {
                    ctx.source_name = Some(record.original_name.clone());
                }
                self.pipeline
                    .run_local(ctx, record.file_type, &record.stored_path, cancel)
                    .await
            }
        }
    }

    /// Success path: manifest, source sidecar, atomic promote, then flip the
    /// entry and job to completed.
    async fn commit(
        &self,
        job: &Job,
        entry: &CacheEntry,
        ctx: &StageContext,
    ) -> Result<String, StoreError> {
        let summary_text = ctx.summary_text.clone().unwrap_or_default();
        let source_name = ctx.source_name.clone().or_else(|| entry.source_name.clone());

        let io_err = |e: &dyn std::fmt::Display| StoreError::QueryFailed(e.to_string());

        let source_doc = crate::domain::SourceDocument {
            source_type: entry.source_type,
            source_ref: entry.source_ref.clone(),
            source_name: source_name.clone(),
        };
        let source_json =
            serde_json::to_vec_pretty(&source_doc).map_err(|e| io_err(&e))?;
        tokio::fs::write(ctx.staging_dir.join("source.json"), source_json)
            .await
            .map_err(|e| io_err(&e))?;

        let artifacts = self
            .bundles
            .scan_artifacts(&job.job_id)
            .await
            .map_err(|e| io_err(&e))?;

        let now = Utc::now();
        let manifest = BundleManifest {
            version: BUNDLE_FORMAT_VERSION.to_string(),
            profile_version: self.profile_version.clone(),
            cache_key: job.cache_key.to_string(),
            source_type: entry.source_type,
            source_ref: entry.source_ref.clone(),
            source_name: source_name.clone(),
            status: EntryStatus::Completed,
            created_at: entry.created_at,
            updated_at: now,
            artifacts,
            summary_text: Some(summary_text.clone()),
            error: None,
        };

        let bundle_path = self
            .bundles
            .promote(&job.job_id, &job.cache_key, entry.source_type, &manifest)
            .await
            .map_err(|e| io_err(&e))?;
        let bundle_path = bundle_path.display().to_string();

        self.store
            .update_entry(
                &job.cache_key,
                EntryUpdate {
                    status: Some(EntryStatus::Completed),
                    summary_text: Some(summary_text),
                    bundle_path: Some(bundle_path.clone()),
                    source_name,
                    ..Default::default()
                },
            )
            .await?;
        self.store
            .update_job(&job.job_id, JobStatus::Completed, None)
            .await?;

        Ok(bundle_path)
    }

    async fn fail(&self, job: &Job, message: &str) -> Result<(), StoreError> {
        if let Err(e) = self.bundles.discard(&job.job_id).await {
            tracing::warn!(error = %e, "Failed to discard staging directory");
        }
        self.store
            .update_entry(
                &job.cache_key,
                EntryUpdate {
                    status: Some(EntryStatus::Failed),
                    error: Some(message.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        self.store
            .update_job(&job.job_id, JobStatus::Failed, Some(message))
            .await?;
        Ok(())
    }
}

/// Startup recovery: sweep jobs left non-terminal by a previous process
/// lifetime to `failed:interrupted` and discard their staging directories.
pub async fn sweep_interrupted(
    store: &dyn MetadataStore,
    bundles: &dyn BundleStore,
) -> Result<usize, StoreError> {
    let swept = store.sweep_interrupted().await?;
    for job_id in &swept {
        if let Err(e) = bundles.discard(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to discard stale staging");
        }
    }
    if !swept.is_empty() {
        tracing::info!(count = swept.len(), "Swept interrupted jobs");
    }
    Ok(swept.len())
}
