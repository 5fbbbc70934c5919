use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use recapd::application::ports::{BundleStore, FileVault, MediaProbe, MetadataStore};
use recapd::application::services::{
    sweep_interrupted, CacheGc, CacheService, CancelRegistry, JobQueue, Pipeline,
    PipelineThresholds, StageLimits, SummaryWorker, UploadService,
};
use recapd::infrastructure::asr::HttpTranscriber;
use recapd::infrastructure::llm::OpenAiSummarizer;
use recapd::infrastructure::media::{
    check_ffmpeg_binary, FfmpegAudioExtractor, YtDlpConfig, YtDlpProbe, YtDlpSubtitleFetcher,
    YtDlpVideoFetcher,
};
use recapd::infrastructure::observability::init_tracing;
use recapd::infrastructure::persistence::SqliteMetadataStore;
use recapd::infrastructure::storage::{FsBundleStore, FsFileVault};
use recapd::infrastructure::subtitles::SniffingSubtitleParser;
use recapd::presentation::rate_limit::ApiRateLimits;
use recapd::presentation::{create_router, AppState, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();

    init_tracing(
        &settings.logging.default_filter,
        settings.logging.json_format,
        settings.server.port,
        &settings.workspace.work_dir,
    );
    tracing::info!(environment = %settings.server.environment, "Starting recapd");

    if let Err(e) = check_ffmpeg_binary() {
        tracing::warn!(error = %e, "ffmpeg unavailable; video and audio sources will fail");
    }

    let work_dir = settings.workspace.work_dir.clone();
    tokio::fs::create_dir_all(&work_dir).await?;

    // Stores.
    let store = Arc::new(SqliteMetadataStore::open(&work_dir.join("metadata.db")).await?);
    let bundles = Arc::new(FsBundleStore::new(&work_dir).await?);
    let vault = Arc::new(
        FsFileVault::new(
            &work_dir,
            settings.uploads.max_file_size,
            settings.uploads.chunk_size,
            Duration::from_secs(settings.uploads.read_timeout_secs),
            Duration::from_secs(settings.uploads.write_timeout_secs),
        )
        .await?,
    );

    let store_dyn: Arc<dyn MetadataStore> = store.clone();
    let bundles_dyn: Arc<dyn BundleStore> = bundles.clone();
    let vault_dyn: Arc<dyn FileVault> = vault;

    // Jobs left running by a previous process lifetime are dead.
    sweep_interrupted(store.as_ref(), bundles.as_ref()).await?;

    // External adapters.
    let ytdlp = YtDlpConfig {
        binary: std::env::var("YTDLP_BINARY").unwrap_or_else(|_| "yt-dlp".to_string()),
        timeout: Duration::from_secs(settings.pipeline.subtitle_download_timeout_secs),
    };
    let probe = Arc::new(YtDlpProbe::new(ytdlp.clone()));
    let probe_dyn: Arc<dyn MediaProbe> = probe.clone();
    let subtitle_fetcher = Arc::new(YtDlpSubtitleFetcher::new(
        ytdlp.clone(),
        settings.pipeline.subtitle_max_size,
    ));
    let video_fetcher = Arc::new(YtDlpVideoFetcher::new(YtDlpConfig {
        timeout: Duration::from_secs(3600),
        ..ytdlp
    }));
    let transcriber = Arc::new(HttpTranscriber::new(
        &settings.asr.endpoint,
        &settings.asr.api_key,
        &settings.asr.model,
        Duration::from_secs(settings.asr.timeout_secs),
    )?);
    let summarizer = Arc::new(OpenAiSummarizer::new(
        &settings.llm.base_url,
        &settings.llm.api_key,
        &settings.llm.model,
        settings.llm.max_tokens,
        settings.llm.temperature,
        Duration::from_secs(settings.llm.timeout_secs),
    )?);

    // Services.
    let shutdown = CancellationToken::new();
    let cancels = Arc::new(CancelRegistry::new(shutdown.clone()));

    let uploads = Arc::new(UploadService::new(
        Arc::clone(&store_dyn),
        Arc::clone(&vault_dyn),
        settings.uploads.concurrency,
        Duration::from_secs(settings.uploads.admission_wait_secs),
        settings.uploads.max_file_size,
        settings.uploads.content_length_grace_bytes,
        settings.uploads.ttl_secs,
    ));

    let cache = Arc::new(CacheService::new(
        Arc::clone(&store_dyn),
        Arc::clone(&bundles_dyn),
        probe_dyn.clone(),
        settings.cache.profile_version.clone(),
        settings.cache.strip_query_params.clone(),
    ));

    let limits = Arc::new(StageLimits::new(
        settings.pipeline.transcode_concurrency,
        settings.pipeline.transcribe_concurrency,
        Duration::from_secs(settings.pipeline.stage_wait_secs),
    ));

    let thresholds = PipelineThresholds {
        coverage_min: settings.pipeline.coverage_min,
        density_min_per_minute: settings.pipeline.density_min_per_minute,
        rms_max: settings.pipeline.rms_max,
        tokens_per_min_min: settings.pipeline.tokens_per_min_min,
        chunk_size_chars: settings.pipeline.chunk_size_chars,
        chunk_overlap_chars: settings.pipeline.chunk_overlap_chars,
        summary_min_chars: settings.pipeline.summary_min_chars,
        video_max_bytes: settings.pipeline.video_max_size,
    };

    let pipeline = Arc::new(Pipeline::new(
        probe_dyn,
        subtitle_fetcher,
        video_fetcher,
        Arc::new(SniffingSubtitleParser),
        Arc::new(FfmpegAudioExtractor),
        transcriber,
        summarizer,
        limits,
        thresholds,
        settings.cache.profile_version.clone(),
    ));

    let (queue, dequeue) = JobQueue::new(settings.pipeline.queue_capacity);
    let queue = Arc::new(queue);
    let dequeue = Arc::new(dequeue);

    let worker = Arc::new(SummaryWorker::new(
        Arc::clone(&store_dyn),
        Arc::clone(&bundles_dyn),
        pipeline,
        Arc::clone(&queue),
        dequeue,
        Arc::clone(&cancels),
        shutdown.clone(),
        settings.cache.profile_version.clone(),
    ));
    let worker_handles = SummaryWorker::spawn_pool(worker, settings.pipeline.worker_count);

    // Background maintenance.
    tokio::spawn(Arc::clone(&uploads).run_reaper(
        Duration::from_secs(settings.uploads.reaper_interval_secs),
        shutdown.clone(),
    ));

    let gc = Arc::new(CacheGc::new(
        Arc::clone(&store_dyn),
        Arc::clone(&bundles_dyn),
        settings.cache.ttl_days,
        settings.cache.failed_ttl_hours,
        settings.cache.max_bytes,
    ));
    tokio::spawn(gc.run(
        Duration::from_secs(settings.cache.gc_interval_secs),
        shutdown.clone(),
    ));

    let state = AppState {
        uploads,
        cache,
        queue,
        cancels: Arc::clone(&cancels),
        rate_limits: Arc::new(ApiRateLimits::new(
            settings.uploads.rate_per_minute,
            settings.cache.summary_rate_per_minute,
        )),
        version: env!("CARGO_PKG_VERSION"),
    };

    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!(addr = %addr, work_dir = %work_dir.display(), "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, cancelling in-flight jobs");
            cancels.cancel_all();
        })
        .await?;

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}
