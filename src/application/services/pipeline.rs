use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AudioExtractor, FetchError, MediaProbe, SubtitleFetcher, SubtitleParser, Summarizer,
    Transcriber, VideoFetcher,
};
use crate::application::services::chunker::split_with_overlap;
use crate::application::services::job_queue::{StageLimits, StageWaitTimeout};
use crate::domain::{ArtifactKind, CacheKey, JobId, SourceType, SubtitleTrack, SummaryDocument};

/// Marker fed to the summarizer when a source yields no usable speech.
pub const EMPTY_TRANSCRIPT_MARKER: &str = "[no speech detected]";

const SUMMARY_INSTRUCTION: &str =
    "Summarize the main points of this video transcript in a few short paragraphs.";
const CHUNK_INSTRUCTION: &str =
    "Summarize this portion of a longer video transcript, keeping every concrete fact.";
const MERGE_INSTRUCTION: &str =
    "Combine these partial summaries of one video into a single coherent summary.";

/// Tunable thresholds for validation, silence detection and chunking.
#[derive(Debug, Clone)]
pub struct PipelineThresholds {
    pub coverage_min: f64,
    pub density_min_per_minute: f64,
    pub rms_max: f32,
    pub tokens_per_min_min: f64,
    pub chunk_size_chars: usize,
    pub chunk_overlap_chars: usize,
    pub summary_min_chars: usize,
    pub video_max_bytes: u64,
}

impl Default for PipelineThresholds {
    fn default() -> Self {
        Self {
            coverage_min: 0.8,
            density_min_per_minute: 1.0,
            rms_max: 0.01,
            tokens_per_min_min: 10.0,
            chunk_size_chars: 12_000,
            chunk_overlap_chars: 400,
            summary_min_chars: 80,
            video_max_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Typed context threaded through the fixed stages. Side effects are limited
/// to the staging directory and calls into the external adapters.
#[derive(Debug)]
pub struct StageContext {
    pub job_id: JobId,
    pub cache_key: CacheKey,
    pub source_type: SourceType,
    pub staging_dir: PathBuf,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
    pub duration_secs: Option<f64>,
    pub video_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub subtitle_path: Option<PathBuf>,
    pub track: Option<SubtitleTrack>,
    pub subtitle_valid: Option<bool>,
    pub coverage: Option<f64>,
    pub audio_rms: Option<f32>,
    pub is_silent: bool,
    pub summary_text: Option<String>,
}

impl StageContext {
    pub fn new(
        job_id: JobId,
        cache_key: CacheKey,
        source_type: SourceType,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            job_id,
            cache_key,
            source_type,
            staging_dir,
            source_url: None,
            source_name: None,
            duration_secs: None,
            video_path: None,
            audio_path: None,
            subtitle_path: None,
            track: None,
            subtitle_valid: None,
            coverage: None,
            audio_rms: None,
            is_silent: false,
            summary_text: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    StageWait(#[from] StageWaitTimeout),
    #[error("video download failed: {0}")]
    VideoFetch(FetchError),
    #[error("subtitle invalid: {0}")]
    SubtitleInvalid(String),
    #[error("audio extraction failed: {0}")]
    Extract(String),
    #[error("transcription failed: {0}")]
    Transcribe(String),
    #[error("summarization failed: {0}")]
    Summarize(String),
    #[error("summary text empty after generation")]
    EmptySummary,
    #[error("unsupported local input: {0}")]
    UnsupportedInput(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short machine-readable kind recorded on failed entries and jobs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Cancelled => "cancelled",
            PipelineError::StageWait(_) => "timeout",
            PipelineError::VideoFetch(FetchError::TooLarge { .. }) => "too-large",
            PipelineError::VideoFetch(FetchError::Timeout) => "timeout",
            PipelineError::VideoFetch(_) => "upstream",
            PipelineError::SubtitleInvalid(_) => "invalid-argument",
            PipelineError::Extract(_) => "upstream",
            PipelineError::Transcribe(_) => "upstream",
            PipelineError::Summarize(_) => "upstream",
            PipelineError::EmptySummary => "upstream",
            PipelineError::UnsupportedInput(_) => "invalid-argument",
            PipelineError::Io(_) => "internal",
        }
    }
}

/// Fixed two-branch pipeline executor. Stages run in a fixed order; the
/// cancel token is observed at every stage boundary.
pub struct Pipeline {
    probe: Arc<dyn MediaProbe>,
    subtitle_fetcher: Arc<dyn SubtitleFetcher>,
    video_fetcher: Arc<dyn VideoFetcher>,
    subtitle_parser: Arc<dyn SubtitleParser>,
    audio_extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    limits: Arc<StageLimits>,
    thresholds: PipelineThresholds,
    profile_version: String,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        probe: Arc<dyn MediaProbe>,
        subtitle_fetcher: Arc<dyn SubtitleFetcher>,
        video_fetcher: Arc<dyn VideoFetcher>,
        subtitle_parser: Arc<dyn SubtitleParser>,
        audio_extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        limits: Arc<StageLimits>,
        thresholds: PipelineThresholds,
        profile_version: String,
    ) -> Self {
        Self {
            probe,
            subtitle_fetcher,
            video_fetcher,
            subtitle_parser,
            audio_extractor,
            transcriber,
            summarizer,
            limits,
            thresholds,
            profile_version,
        }
    }

    /// URL branch: metadata, subtitles first, transcription fallback.
    pub async fn run_url(
        &self,
        mut ctx: StageContext,
        cancel: &CancellationToken,
    ) -> Result<StageContext, PipelineError> {
        let url = ctx
            .source_url
            .clone()
            .ok_or_else(|| PipelineError::UnsupportedInput("url source without url".into()))?;

        checkpoint(cancel)?;
        self.fetch_metadata(&mut ctx, &url).await;

        checkpoint(cancel)?;
        self.try_subtitles(&mut ctx, &url).await?;

        if ctx.subtitle_valid != Some(true) {
            checkpoint(cancel)?;
            self.download_video(&mut ctx, &url).await?;

            checkpoint(cancel)?;
            self.extract_audio(&mut ctx).await?;

            checkpoint(cancel)?;
            self.transcribe(&mut ctx).await?;
        }

        checkpoint(cancel)?;
        self.write_asr_json(&ctx).await?;

        checkpoint(cancel)?;
        self.summarize(&mut ctx, cancel).await?;

        self.write_summary_json(&ctx).await?;
        Ok(ctx)
    }

    /// Local branch: dispatch on the uploaded file's declared type.
    pub async fn run_local(
        &self,
        mut ctx: StageContext,
        file_type: crate::domain::FileType,
        stored_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<StageContext, PipelineError> {
        checkpoint(cancel)?;
        self.import_local_input(&mut ctx, file_type, stored_path)
            .await?;

        match file_type {
            crate::domain::FileType::Subtitle => {
                checkpoint(cancel)?;
                let path = ctx.subtitle_path.clone().ok_or_else(|| {
                    PipelineError::UnsupportedInput("subtitle input missing".into())
                })?;
                match self.subtitle_parser.parse(&path).await {
                    Ok(track) => {
                        self.validate_subtitles(&mut ctx, track);
                    }
                    Err(e) => {
                        return Err(PipelineError::SubtitleInvalid(e.to_string()));
                    }
                }
                if ctx.subtitle_valid != Some(true) {
                    return Err(PipelineError::SubtitleInvalid(
                        "coverage or density below threshold".into(),
                    ));
                }
            }
            crate::domain::FileType::Audio => {
                checkpoint(cancel)?;
                self.transcribe(&mut ctx).await?;
            }
            crate::domain::FileType::Video => {
                checkpoint(cancel)?;
                self.extract_audio(&mut ctx).await?;
                checkpoint(cancel)?;
                self.transcribe(&mut ctx).await?;
            }
        }

        checkpoint(cancel)?;
        self.write_asr_json(&ctx).await?;

        checkpoint(cancel)?;
        self.summarize(&mut ctx, cancel).await?;

        self.write_summary_json(&ctx).await?;
        Ok(ctx)
    }

    /// Copy the stored upload into staging under its canonical artifact name.
    async fn import_local_input(
        &self,
        ctx: &mut StageContext,
        file_type: crate::domain::FileType,
        stored_path: &Path,
    ) -> Result<(), PipelineError> {
        let ext = stored_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let kind = match file_type {
            crate::domain::FileType::Subtitle => ArtifactKind::Subtitle,
            crate::domain::FileType::Audio => ArtifactKind::Audio,
            crate::domain::FileType::Video => ArtifactKind::Video,
        };

        let target = ctx.staging_dir.join(kind.file_name(ext.as_deref()));
        tokio::fs::copy(stored_path, &target).await?;

        match file_type {
            crate::domain::FileType::Subtitle => ctx.subtitle_path = Some(target),
            crate::domain::FileType::Audio => ctx.audio_path = Some(target),
            crate::domain::FileType::Video => ctx.video_path = Some(target),
        }
        Ok(())
    }

    /// Probe failures are tolerated: the pipeline continues with unknown
    /// duration and the subtitle validator defaults to optimism.
    async fn fetch_metadata(&self, ctx: &mut StageContext, url: &str) {
        match self.probe.probe(url).await {
            Ok(probe) => {
                ctx.duration_secs = probe.duration_secs;
                if ctx.source_name.is_none() {
                    ctx.source_name = probe.title;
                }
                tracing::debug!(
                    duration = ?ctx.duration_secs,
                    "Fetched source metadata"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metadata probe failed, continuing without duration");
            }
        }
    }

    /// Subtitle-first: fetch, parse, validate. Any failure leaves
    /// `subtitle_valid = false` and sends the run down the transcription
    /// fallback; it never aborts the URL branch.
    async fn try_subtitles(&self, ctx: &mut StageContext, url: &str) -> Result<(), PipelineError> {
        let fetched = match self.subtitle_fetcher.fetch(url, &ctx.staging_dir).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "Subtitle download failed");
                ctx.subtitle_valid = Some(false);
                return Ok(());
            }
        };

        let Some(path) = fetched else {
            tracing::debug!("No subtitles advertised");
            ctx.subtitle_valid = Some(false);
            return Ok(());
        };

        match self.subtitle_parser.parse(&path).await {
            Ok(track) => {
                ctx.subtitle_path = Some(path);
                self.validate_subtitles(ctx, track);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Subtitle parse failed");
                ctx.subtitle_valid = Some(false);
            }
        }
        Ok(())
    }

    /// Coverage uses summed segment durations, not first-to-last span.
    /// Unknown duration defaults to valid (subtitle-first optimism).
    fn validate_subtitles(&self, ctx: &mut StageContext, track: SubtitleTrack) {
        let track = track.normalize();
        if track.is_empty() {
            ctx.subtitle_valid = Some(false);
            ctx.coverage = Some(0.0);
            return;
        }

        let Some(duration) = ctx.duration_secs.filter(|d| *d > 0.0) else {
            ctx.subtitle_valid = Some(true);
            ctx.coverage = Some(1.0);
            ctx.track = Some(track);
            return;
        };

        let coverage = track.covered_ms() as f64 / (duration * 1000.0);
        let segments_per_minute = track.len() as f64 / (duration / 60.0).max(0.1);
        let valid = coverage >= self.thresholds.coverage_min
            && segments_per_minute >= self.thresholds.density_min_per_minute;

        tracing::info!(coverage, density = segments_per_minute, valid, "Subtitle validation");

        ctx.coverage = Some(coverage);
        ctx.subtitle_valid = Some(valid);
        if valid {
            ctx.track = Some(track);
        }
    }

    async fn download_video(&self, ctx: &mut StageContext, url: &str) -> Result<(), PipelineError> {
        let path = self
            .video_fetcher
            .fetch(url, &ctx.staging_dir, self.thresholds.video_max_bytes)
            .await
            .map_err(PipelineError::VideoFetch)?;
        ctx.video_path = Some(path);
        Ok(())
    }

    async fn extract_audio(&self, ctx: &mut StageContext) -> Result<(), PipelineError> {
        let video = ctx
            .video_path
            .clone()
            .ok_or_else(|| PipelineError::Extract("no video to extract from".into()))?;
        let wav_out = ctx.staging_dir.join(ArtifactKind::Audio.file_name(None));

        let _permit = self.limits.acquire_transcode().await?;
        let stats = self
            .audio_extractor
            .extract_wav(&video, &wav_out)
            .await
            .map_err(|e| PipelineError::Extract(e.to_string()))?;

        ctx.audio_path = Some(wav_out);
        ctx.audio_rms = Some(stats.rms);
        if ctx.duration_secs.is_none() {
            ctx.duration_secs = stats.duration_secs;
        }
        Ok(())
    }

    async fn transcribe(&self, ctx: &mut StageContext) -> Result<(), PipelineError> {
        let audio = ctx
            .audio_path
            .clone()
            .ok_or_else(|| PipelineError::Transcribe("no audio to transcribe".into()))?;

        let _permit = self.limits.acquire_transcribe().await?;
        let track = self
            .transcriber
            .transcribe(&audio)
            .await
            .map_err(|e| PipelineError::Transcribe(e.to_string()))?
            .normalize();

        self.detect_silence(ctx, &track);
        ctx.track = Some(track);
        Ok(())
    }

    /// A source is silent when the transcript is too sparse for its length
    /// or the measured amplitude sits under the floor. Summarization still
    /// proceeds, on the empty-transcript marker if nothing was heard.
    fn detect_silence(&self, ctx: &mut StageContext, track: &SubtitleTrack) {
        let transcript_chars: usize = track.segments.iter().map(|s| s.text.chars().count()).sum();

        let tokens_per_minute = match ctx.duration_secs.filter(|d| *d > 0.0) {
            Some(duration) => transcript_chars as f64 / (duration / 60.0),
            None => {
                if transcript_chars == 0 {
                    0.0
                } else {
                    f64::MAX
                }
            }
        };

        let rms_silent = ctx
            .audio_rms
            .map(|rms| rms <= self.thresholds.rms_max)
            .unwrap_or(false);

        ctx.is_silent = tokens_per_minute < self.thresholds.tokens_per_min_min || rms_silent;
        if ctx.is_silent {
            tracing::info!(tokens_per_minute, rms = ?ctx.audio_rms, "Silence detected");
        }
    }

    /// Chunked summarization with a merge pass; a merged summary under the
    /// floor triggers one unchunked retry on the raw transcript.
    async fn summarize(
        &self,
        ctx: &mut StageContext,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let transcript = ctx
            .track
            .as_ref()
            .map(|t| t.to_transcript())
            .unwrap_or_default();

        let text = if transcript.trim().is_empty() {
            EMPTY_TRANSCRIPT_MARKER.to_string()
        } else {
            transcript
        };

        let chunks = split_with_overlap(
            &text,
            self.thresholds.chunk_size_chars,
            self.thresholds.chunk_overlap_chars,
        );

        let summary = if chunks.len() == 1 {
            self.call_summarizer(SUMMARY_INSTRUCTION, &chunks[0]).await?
        } else {
            let mut partials = Vec::with_capacity(chunks.len());
            for (i, chunk) in chunks.iter().enumerate() {
                checkpoint(cancel)?;
                tracing::debug!(chunk = i + 1, total = chunks.len(), "Summarizing chunk");
                partials.push(self.call_summarizer(CHUNK_INSTRUCTION, chunk).await?);
            }
            checkpoint(cancel)?;
            let merged = self
                .call_summarizer(MERGE_INSTRUCTION, &partials.join("\n\n"))
                .await?;

            if merged.chars().count() < self.thresholds.summary_min_chars {
                checkpoint(cancel)?;
                tracing::warn!("Merged summary below floor, retrying unchunked");
                self.call_summarizer(SUMMARY_INSTRUCTION, &text).await?
            } else {
                merged
            }
        };

        if summary.trim().is_empty() {
            return Err(PipelineError::EmptySummary);
        }

        ctx.summary_text = Some(summary.trim().to_string());
        Ok(())
    }

    async fn call_summarizer(
        &self,
        instruction: &str,
        text: &str,
    ) -> Result<String, PipelineError> {
        self.summarizer
            .summarize(instruction, text)
            .await
            .map_err(|e| PipelineError::Summarize(e.to_string()))
    }

    async fn write_asr_json(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let Some(track) = &ctx.track else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(track)
            .map_err(|e| PipelineError::Summarize(e.to_string()))?;
        tokio::fs::write(ctx.staging_dir.join(ArtifactKind::Asr.file_name(None)), json).await?;
        Ok(())
    }

    async fn write_summary_json(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let summary_text = ctx.summary_text.clone().ok_or(PipelineError::EmptySummary)?;
        let input_chars = ctx
            .track
            .as_ref()
            .map(|t| t.to_transcript().chars().count() as u64)
            .unwrap_or(0);

        let doc = SummaryDocument {
            summary_text,
            model: self.summarizer.model().to_string(),
            input_chars,
            profile_version: self.profile_version.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| PipelineError::Summarize(e.to_string()))?;
        tokio::fs::write(ctx.staging_dir.join(ArtifactKind::Summary.file_name(None)), json).await?;
        Ok(())
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}
