mod common;

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use tokio_util::sync::CancellationToken;

use common::{
    build_pipeline, harness, harness_with, wait_for_entry, wait_for_job, MockPipelineParts,
    COVERING_SRT, PROFILE_VERSION, SAMPLE_SRT,
};
use recapd::application::ports::{BundleStore, GetOrCreateOutcome, MetadataStore};
use recapd::application::services::{sweep_interrupted, PipelineError, StageContext};
use recapd::domain::{EntryStatus, JobStatus, SourceType};
use recapd::infrastructure::asr::MockTranscriber;
use recapd::infrastructure::llm::MockSummarizer;
use recapd::infrastructure::media::MockSubtitleFetcher;

fn srt_stream(content: &str) -> futures::stream::BoxStream<'static, Result<Bytes, io::Error>> {
    Box::pin(stream::iter(vec![Ok(Bytes::copy_from_slice(
        content.as_bytes(),
    ))]))
}

#[tokio::test]
async fn given_uploaded_subtitle_when_summarized_then_entry_completes_with_valid_bundle() {
    let h = harness().await;

    let record = h
        .uploads
        .put(srt_stream(SAMPLE_SRT), "sample.srt", None, None)
        .await
        .unwrap();

    let source = h
        .cache
        .resolve_local(&record.file_hash, Some(record.original_name.clone()));
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Completed);

    let entry = h.store.get_entry(&source.cache_key).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);
    assert!(entry
        .summary_text
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty()));
    assert_eq!(entry.profile_version, PROFILE_VERSION);

    h.bundles
        .validate(&source.cache_key, SourceType::Local, PROFILE_VERSION)
        .await
        .unwrap();

    // The bundle carries the subtitle input and both json artifacts.
    let manifest = h
        .bundles
        .load_manifest(&source.cache_key, SourceType::Local)
        .await
        .unwrap();
    assert!(manifest.artifacts.contains_key("subtitle"));
    assert!(manifest.artifacts.contains_key("asr"));
    assert!(manifest.artifacts.contains_key("summary"));
}

#[tokio::test]
async fn given_url_with_valid_subtitles_when_run_then_transcription_is_skipped() {
    let parts = MockPipelineParts {
        subtitle_fetcher: Arc::new(MockSubtitleFetcher::with_content(
            "subtitle.srt",
            COVERING_SRT,
        )),
        // A failing transcriber proves the fallback never runs.
        transcriber: Arc::new(MockTranscriber::failing()),
        ..Default::default()
    };
    let h = harness_with(parts, 1).await;

    let source = h.cache.resolve_url("https://example.com/v/abc").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Completed);

    let entry = h.store.get_entry(&source.cache_key).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);

    let manifest = h
        .bundles
        .load_manifest(&source.cache_key, SourceType::Url)
        .await
        .unwrap();
    assert!(manifest.artifacts.contains_key("subtitle"));
    assert!(!manifest.artifacts.contains_key("audio"));
    assert!(!manifest.artifacts.contains_key("video"));
}

#[tokio::test]
async fn given_coverage_exactly_at_threshold_then_subtitles_are_valid() {
    // Probed duration is 10s; summed cue time is exactly 8s = 0.8 coverage.
    let srt = "1\n00:00:00,000 --> 00:00:04,000\nfirst\n\n2\n00:00:04,000 --> 00:00:08,000\nsecond\n";
    let parts = MockPipelineParts {
        subtitle_fetcher: Arc::new(MockSubtitleFetcher::with_content("subtitle.srt", srt)),
        transcriber: Arc::new(MockTranscriber::failing()),
        ..Default::default()
    };
    let h = harness_with(parts, 1).await;

    let source = h.cache.resolve_url("https://example.com/v/edge").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Completed);
}

#[tokio::test]
async fn given_coverage_strictly_below_threshold_then_fallback_transcribes() {
    // Summed cue time 7.9s over 10s sits just under the 0.8 floor.
    let srt = "1\n00:00:00,000 --> 00:00:04,000\nfirst\n\n2\n00:00:04,000 --> 00:00:07,900\nsecond\n";
    let parts = MockPipelineParts {
        subtitle_fetcher: Arc::new(MockSubtitleFetcher::with_content("subtitle.srt", srt)),
        ..Default::default()
    };
    let h = harness_with(parts, 1).await;

    let source = h.cache.resolve_url("https://example.com/v/thin").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Completed);

    // The fallback ran: the bundle carries extracted audio.
    let manifest = h
        .bundles
        .load_manifest(&source.cache_key, SourceType::Url)
        .await
        .unwrap();
    assert!(manifest.artifacts.contains_key("audio"));
}

#[tokio::test]
async fn given_url_without_subtitles_when_run_then_falls_back_to_transcription() {
    let h = harness_with(MockPipelineParts::default(), 1).await;

    let source = h.cache.resolve_url("https://example.com/v/abc").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Completed);

    let manifest = h
        .bundles
        .load_manifest(&source.cache_key, SourceType::Url)
        .await
        .unwrap();
    assert!(manifest.artifacts.contains_key("video"));
    assert!(manifest.artifacts.contains_key("audio"));
    assert!(manifest.artifacts.contains_key("asr"));
}

#[tokio::test]
async fn given_silent_audio_when_run_then_summary_still_produced() {
    let parts = MockPipelineParts {
        transcriber: Arc::new(MockTranscriber::with_track(
            recapd::domain::SubtitleTrack::default(),
        )),
        audio_extractor: Arc::new(recapd::infrastructure::media::MockAudioExtractor::new(
            0.001,
            Some(10.0),
        )),
        ..Default::default()
    };
    let h = harness_with(parts, 1).await;

    let source = h.cache.resolve_url("https://example.com/v/silent").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Completed);

    let entry = h.store.get_entry(&source.cache_key).await.unwrap().unwrap();
    // The mock summarizer echoes its input, which is the marker here.
    assert!(entry.summary_text.unwrap().contains("no speech detected"));
}

#[tokio::test]
async fn given_summarizer_failure_when_run_then_entry_fails_and_staging_is_discarded() {
    let parts = MockPipelineParts {
        summarizer: Arc::new(MockSummarizer::failing()),
        ..Default::default()
    };
    let h = harness_with(parts, 1).await;

    let source = h.cache.resolve_url("https://example.com/v/doomed").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(job.job_id.clone());

    assert_eq!(wait_for_job(&h.store, &job.job_id).await, JobStatus::Failed);

    let entry = h.store.get_entry(&source.cache_key).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Failed);
    assert!(entry.error.unwrap().starts_with("upstream"));

    // No orphan staging directory remains.
    assert!(!tokio::fs::try_exists(h.bundles.staging_dir(&job.job_id))
        .await
        .unwrap());
}

#[tokio::test]
async fn given_refresh_after_completion_then_new_bundle_replaces_old() {
    let h = harness().await;

    let record = h
        .uploads
        .put(srt_stream(SAMPLE_SRT), "sample.srt", None, None)
        .await
        .unwrap();
    let source = h
        .cache
        .resolve_local(&record.file_hash, Some(record.original_name.clone()));

    let GetOrCreateOutcome::Enqueue { job: first, .. } =
        h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };
    h.queue.enqueue(first.job_id.clone());
    assert_eq!(wait_for_job(&h.store, &first.job_id).await, JobStatus::Completed);

    let GetOrCreateOutcome::Enqueue { job: second, .. } =
        h.cache.get_or_create(&source, true).await.unwrap()
    else {
        panic!("refresh must create a job");
    };
    assert_ne!(first.job_id, second.job_id);
    h.queue.enqueue(second.job_id.clone());
    assert_eq!(wait_for_job(&h.store, &second.job_id).await, JobStatus::Completed);

    assert_eq!(wait_for_entry(&h.store, &source.cache_key).await, EntryStatus::Completed);
    h.bundles
        .validate(&source.cache_key, SourceType::Local, PROFILE_VERSION)
        .await
        .unwrap();

    // Exactly one bundle directory, no orphan staging.
    let tmp = h.workspace.path().join("tmp");
    let mut entries = tokio::fs::read_dir(&tmp).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn given_cancelled_token_when_pipeline_runs_then_cancelled_error() {
    let pipeline = build_pipeline(MockPipelineParts::default());
    let staging = tempfile::TempDir::new().unwrap();

    let mut ctx = StageContext::new(
        recapd::domain::JobId::generate(),
        recapd::domain::CacheKey::parse(&"9".repeat(64)).unwrap(),
        SourceType::Url,
        staging.path().to_path_buf(),
    );
    ctx.source_url = Some("https://example.com/v/abc".to_string());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline.run_url(ctx, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(err.kind(), "cancelled");
}

#[tokio::test]
async fn given_jobs_left_running_when_swept_then_failed_interrupted() {
    let h = harness_with(MockPipelineParts::default(), 0).await;

    let source = h.cache.resolve_url("https://example.com/v/abc").await.unwrap();
    let GetOrCreateOutcome::Enqueue { job, .. } = h.cache.get_or_create(&source, false).await.unwrap()
    else {
        panic!("expected fresh job");
    };

    // Simulate a crash mid-flight: the job row says running, staging exists.
    h.store
        .update_job(&job.job_id, JobStatus::Running, None)
        .await
        .unwrap();
    h.bundles.stage(&job.job_id).await.unwrap();

    let swept = sweep_interrupted(h.store.as_ref(), h.bundles.as_ref()).await.unwrap();
    assert_eq!(swept, 1);

    let job = h.store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("interrupted"));

    let entry = h.store.get_entry(&source.cache_key).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Failed);
    assert_eq!(entry.error.as_deref(), Some("interrupted"));

    assert!(!tokio::fs::try_exists(h.bundles.staging_dir(&job.job_id))
        .await
        .unwrap());

    // Re-requesting after the sweep creates a fresh job.
    let outcome = h.cache.get_or_create(&source, true).await.unwrap();
    assert!(matches!(outcome, GetOrCreateOutcome::Enqueue { .. }));
}
