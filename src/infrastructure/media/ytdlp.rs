use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::application::ports::{
    FetchError, MediaProbe, ProbeError, SourceProbe, SubtitleFetcher, VideoFetcher,
};

/// Shared configuration for the yt-dlp adapters. Only the process contract
/// is owned here; the downloader itself is an external collaborator.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: String,
    pub timeout: Duration,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

async fn run_ytdlp(
    config: &YtDlpConfig,
    args: &[&str],
) -> Result<std::process::Output, FetchError> {
    let child = Command::new(&config.binary)
        .args(args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(config.timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(FetchError::Failed(format!("spawn {}: {}", config.binary, e))),
        Err(_) => Err(FetchError::Timeout),
    }
}

#[derive(Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    extractor_key: Option<String>,
    #[serde(default)]
    extractor: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    subtitles: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    automatic_captions: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Probe a URL with `yt-dlp -J` for identity and metadata.
pub struct YtDlpProbe {
    config: YtDlpConfig,
}

impl YtDlpProbe {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaProbe for YtDlpProbe {
    async fn probe(&self, url: &str) -> Result<SourceProbe, ProbeError> {
        let output = run_ytdlp(
            &self.config,
            &["-J", "--skip-download", "--no-warnings", "--quiet", url],
        )
        .await
        .map_err(|e| match e {
            FetchError::Timeout => ProbeError::Timeout,
            other => ProbeError::Failed(other.to_string()),
        })?;

        if !output.status.success() {
            return Err(ProbeError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Failed(format!("metadata parse: {}", e)))?;

        let has_subtitles = info
            .subtitles
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
            || info
                .automatic_captions
                .as_ref()
                .map(|s| !s.is_empty())
                .unwrap_or(false);

        Ok(SourceProbe {
            extractor: info
                .extractor_key
                .or(info.extractor)
                .map(|e| e.to_ascii_lowercase()),
            video_id: info.id,
            title: info.title,
            duration_secs: info.duration,
            has_subtitles,
        })
    }
}

async fn find_prefixed(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut matches = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.len() > prefix.len() {
            matches.push(entry.path());
        }
    }
    matches.sort();
    matches.into_iter().next()
}

/// Subtitle-only download; manual tracks preferred, auto captions accepted.
pub struct YtDlpSubtitleFetcher {
    config: YtDlpConfig,
    max_bytes: u64,
}

impl YtDlpSubtitleFetcher {
    pub fn new(config: YtDlpConfig, max_bytes: u64) -> Self {
        Self { config, max_bytes }
    }
}

#[async_trait]
impl SubtitleFetcher for YtDlpSubtitleFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<Option<PathBuf>, FetchError> {
        let dest = dest_dir.display().to_string();
        let output = run_ytdlp(
            &self.config,
            &[
                "--skip-download",
                "--write-subs",
                "--write-auto-subs",
                "--sub-format",
                "vtt/srt/ass",
                "--no-warnings",
                "--quiet",
                "--paths",
                &dest,
                "-o",
                "subtitle.%(ext)s",
                url,
            ],
        )
        .await?;

        if !output.status.success() {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "yt-dlp subtitle fetch failed"
            );
            return Ok(None);
        }

        let Some(path) = find_prefixed(dest_dir, "subtitle.").await else {
            return Ok(None);
        };

        let size = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size > self.max_bytes {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        Ok(Some(path))
    }
}

/// Full video download, bounded by `max_bytes`.
pub struct YtDlpVideoFetcher {
    config: YtDlpConfig,
}

impl YtDlpVideoFetcher {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl VideoFetcher for YtDlpVideoFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        max_bytes: u64,
    ) -> Result<PathBuf, FetchError> {
        let dest = dest_dir.display().to_string();
        let max = max_bytes.to_string();
        let output = run_ytdlp(
            &self.config,
            &[
                "-f",
                "best[ext=mp4]/best",
                "--max-filesize",
                &max,
                "--no-warnings",
                "--quiet",
                "--paths",
                &dest,
                "-o",
                "video.%(ext)s",
                url,
            ],
        )
        .await?;

        if !output.status.success() {
            return Err(FetchError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        match find_prefixed(dest_dir, "video.").await {
            Some(path) => Ok(path),
            // yt-dlp skips silently when --max-filesize is exceeded.
            None => Err(FetchError::TooLarge { limit: max_bytes }),
        }
    }
}
