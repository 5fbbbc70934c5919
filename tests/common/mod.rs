//! Shared fixtures: in-memory store, tempdir-backed stores, mock adapters,
//! and a fully wired router for API tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use recapd::application::ports::{
    BundleStore, FileVault, MediaProbe, MetadataStore, SourceProbe,
};
use recapd::application::services::{
    CacheService, CancelRegistry, JobDequeue, JobQueue, Pipeline, PipelineThresholds, StageLimits,
    SummaryWorker, UploadService,
};
use recapd::domain::{EntryStatus, JobStatus};
use recapd::infrastructure::asr::MockTranscriber;
use recapd::infrastructure::llm::MockSummarizer;
use recapd::infrastructure::media::{
    MockAudioExtractor, MockProbe, MockSubtitleFetcher, MockVideoFetcher,
};
use recapd::infrastructure::persistence::SqliteMetadataStore;
use recapd::infrastructure::storage::{FsBundleStore, FsFileVault};
use recapd::infrastructure::subtitles::SniffingSubtitleParser;
use recapd::presentation::rate_limit::ApiRateLimits;
use recapd::presentation::{create_router, AppState};

pub const PROFILE_VERSION: &str = "v1";

/// Minimal single-cue SRT used by the upload and summarize scenarios.
pub const SAMPLE_SRT: &str = "1\n00:00:00,000 --> 00:00:05,000\nhello world\n";

/// SRT covering most of a 10 second video.
pub const COVERING_SRT: &str = "1\n00:00:00,000 --> 00:00:05,000\nfirst half of the talk\n\n2\n00:00:05,000 --> 00:00:09,500\nsecond half of the talk\n";

pub async fn memory_store() -> Arc<SqliteMetadataStore> {
    Arc::new(
        SqliteMetadataStore::open_in_memory()
            .await
            .expect("in-memory store"),
    )
}

pub async fn temp_bundle_store(dir: &tempfile::TempDir) -> Arc<FsBundleStore> {
    Arc::new(FsBundleStore::new(dir.path()).await.expect("bundle store"))
}

pub async fn temp_vault(dir: &tempfile::TempDir, max_bytes: u64) -> Arc<FsFileVault> {
    Arc::new(
        FsFileVault::new(
            dir.path(),
            max_bytes,
            64 * 1024,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await
        .expect("vault"),
    )
}

pub fn upload_service(
    store: Arc<dyn MetadataStore>,
    vault: Arc<dyn FileVault>,
    max_bytes: u64,
    ttl_secs: u64,
) -> Arc<UploadService> {
    Arc::new(UploadService::new(
        store,
        vault,
        2,
        Duration::from_secs(2),
        max_bytes,
        1024,
        ttl_secs,
    ))
}

pub fn cache_service(
    store: Arc<dyn MetadataStore>,
    bundles: Arc<dyn BundleStore>,
    probe: Arc<dyn MediaProbe>,
) -> Arc<CacheService> {
    Arc::new(CacheService::new(
        store,
        bundles,
        probe,
        PROFILE_VERSION.to_string(),
        vec!["utm_source".to_string()],
    ))
}

pub fn probe_with_duration(duration_secs: f64) -> Arc<MockProbe> {
    Arc::new(MockProbe::new(SourceProbe {
        extractor: Some("example".to_string()),
        video_id: Some("abc123".to_string()),
        title: Some("A Test Video".to_string()),
        duration_secs: Some(duration_secs),
        has_subtitles: true,
    }))
}

pub fn thresholds() -> PipelineThresholds {
    PipelineThresholds {
        coverage_min: 0.8,
        density_min_per_minute: 1.0,
        rms_max: 0.01,
        tokens_per_min_min: 10.0,
        chunk_size_chars: 12_000,
        chunk_overlap_chars: 400,
        summary_min_chars: 4,
        video_max_bytes: 1024 * 1024,
    }
}

/// Pipeline wired entirely from mocks (plus the real subtitle parser).
pub struct MockPipelineParts {
    pub probe: Arc<MockProbe>,
    pub subtitle_fetcher: Arc<MockSubtitleFetcher>,
    pub video_fetcher: Arc<MockVideoFetcher>,
    pub audio_extractor: Arc<MockAudioExtractor>,
    pub transcriber: Arc<MockTranscriber>,
    pub summarizer: Arc<MockSummarizer>,
}

impl Default for MockPipelineParts {
    fn default() -> Self {
        Self {
            probe: probe_with_duration(10.0),
            subtitle_fetcher: Arc::new(MockSubtitleFetcher::none()),
            video_fetcher: Arc::new(MockVideoFetcher::with_bytes(b"videobytes".to_vec())),
            audio_extractor: Arc::new(MockAudioExtractor::new(0.2, Some(10.0))),
            transcriber: Arc::new(MockTranscriber::with_track(recapd::domain::SubtitleTrack::new(
                vec![recapd::domain::SubtitleSegment::new(
                    "spoken words from the recording of this test video",
                    0,
                    9_000,
                )],
            ))),
            summarizer: Arc::new(MockSummarizer::new()),
        }
    }
}

pub fn build_pipeline(parts: MockPipelineParts) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(
        parts.probe,
        parts.subtitle_fetcher,
        parts.video_fetcher,
        Arc::new(SniffingSubtitleParser),
        parts.audio_extractor,
        parts.transcriber,
        parts.summarizer,
        Arc::new(StageLimits::new(2, 2, Duration::from_secs(5))),
        thresholds(),
        PROFILE_VERSION.to_string(),
    ))
}

/// Everything a worker-driven test needs to reach into.
pub struct TestHarness {
    pub store: Arc<SqliteMetadataStore>,
    pub bundles: Arc<FsBundleStore>,
    pub uploads: Arc<UploadService>,
    pub cache: Arc<CacheService>,
    pub queue: Arc<JobQueue>,
    pub cancels: Arc<CancelRegistry>,
    pub shutdown: CancellationToken,
    pub workspace: tempfile::TempDir,
}

pub async fn harness_with(parts: MockPipelineParts, worker_count: usize) -> TestHarness {
    let workspace = tempfile::TempDir::new().expect("tempdir");
    let store = memory_store().await;
    let bundles = temp_bundle_store(&workspace).await;
    let vault = temp_vault(&workspace, 10 * 1024 * 1024).await;

    let store_dyn: Arc<dyn MetadataStore> = store.clone();
    let bundles_dyn: Arc<dyn BundleStore> = bundles.clone();

    let probe: Arc<dyn MediaProbe> = parts.probe.clone();
    let uploads = upload_service(store_dyn.clone(), vault, 10 * 1024 * 1024, 3600);
    let cache = cache_service(store_dyn.clone(), bundles_dyn.clone(), probe);

    let pipeline = build_pipeline(parts);

    let (queue, dequeue) = JobQueue::new(16);
    let queue = Arc::new(queue);
    let dequeue: Arc<JobDequeue> = Arc::new(dequeue);

    let shutdown = CancellationToken::new();
    let cancels = Arc::new(CancelRegistry::new(shutdown.clone()));

    let worker = Arc::new(SummaryWorker::new(
        store_dyn,
        bundles_dyn,
        pipeline,
        queue.clone(),
        dequeue,
        cancels.clone(),
        shutdown.clone(),
        PROFILE_VERSION.to_string(),
    ));
    SummaryWorker::spawn_pool(worker, worker_count);

    TestHarness {
        store,
        bundles,
        uploads,
        cache,
        queue,
        cancels,
        shutdown,
        workspace,
    }
}

pub async fn harness() -> TestHarness {
    harness_with(MockPipelineParts::default(), 1).await
}

pub fn test_router(harness: &TestHarness, upload_rate: u32, summary_rate: u32) -> Router {
    let state = AppState {
        uploads: harness.uploads.clone(),
        cache: harness.cache.clone(),
        queue: harness.queue.clone(),
        cancels: harness.cancels.clone(),
        rate_limits: Arc::new(ApiRateLimits::new(upload_rate, summary_rate)),
        version: env!("CARGO_PKG_VERSION"),
    };
    create_router(state)
}

/// Poll a job until it reaches a terminal status.
pub async fn wait_for_job(
    store: &SqliteMetadataStore,
    job_id: &recapd::domain::JobId,
) -> JobStatus {
    for _ in 0..300 {
        let job = store
            .get_job(job_id)
            .await
            .expect("job query")
            .expect("job exists");
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal status", job_id);
}

pub async fn wait_for_entry(
    store: &SqliteMetadataStore,
    cache_key: &recapd::domain::CacheKey,
) -> EntryStatus {
    for _ in 0..300 {
        let entry = store
            .get_entry(cache_key)
            .await
            .expect("entry query")
            .expect("entry exists");
        if entry.status.is_terminal() {
            return entry.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("entry {} never reached a terminal status", cache_key);
}
