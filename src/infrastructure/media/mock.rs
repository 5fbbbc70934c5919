//! Mock adapters for the media-side ports, used by tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::application::ports::{
    AudioExtractor, AudioStats, ExtractError, FetchError, MediaProbe, ProbeError, SourceProbe,
    SubtitleFetcher, VideoFetcher,
};

/// Returns a fixed probe result; optionally fails every call.
pub struct MockProbe {
    pub result: SourceProbe,
    pub fail: bool,
    calls: AtomicUsize,
}

impl MockProbe {
    pub fn new(result: SourceProbe) -> Self {
        Self {
            result,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: SourceProbe::default(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    async fn probe(&self, _url: &str) -> Result<SourceProbe, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProbeError::Failed("mock probe failure".to_string()));
        }
        Ok(self.result.clone())
    }
}

/// Writes canned subtitle content into the destination directory, or
/// reports that no subtitles are advertised.
pub struct MockSubtitleFetcher {
    pub content: Option<(String, String)>,
}

impl MockSubtitleFetcher {
    /// `file_name` must carry the subtitle extension (e.g. `subtitle.srt`).
    pub fn with_content(file_name: &str, content: &str) -> Self {
        Self {
            content: Some((file_name.to_string(), content.to_string())),
        }
    }

    pub fn none() -> Self {
        Self { content: None }
    }
}

#[async_trait]
impl SubtitleFetcher for MockSubtitleFetcher {
    async fn fetch(&self, _url: &str, dest_dir: &Path) -> Result<Option<PathBuf>, FetchError> {
        match &self.content {
            Some((name, content)) => {
                let path = dest_dir.join(name);
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| FetchError::Failed(e.to_string()))?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }
}

/// Writes canned bytes as the downloaded video.
pub struct MockVideoFetcher {
    pub bytes: Vec<u8>,
    pub fail: bool,
}

impl MockVideoFetcher {
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            bytes: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl VideoFetcher for MockVideoFetcher {
    async fn fetch(
        &self,
        _url: &str,
        dest_dir: &Path,
        max_bytes: u64,
    ) -> Result<PathBuf, FetchError> {
        if self.fail {
            return Err(FetchError::Failed("mock download failure".to_string()));
        }
        if self.bytes.len() as u64 > max_bytes {
            return Err(FetchError::TooLarge { limit: max_bytes });
        }
        let path = dest_dir.join("video.mp4");
        tokio::fs::write(&path, &self.bytes)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        Ok(path)
    }
}

/// Writes an empty wav and reports configured stats.
pub struct MockAudioExtractor {
    pub rms: f32,
    pub duration_secs: Option<f64>,
}

impl MockAudioExtractor {
    pub fn new(rms: f32, duration_secs: Option<f64>) -> Self {
        Self { rms, duration_secs }
    }
}

#[async_trait]
impl AudioExtractor for MockAudioExtractor {
    async fn extract_wav(&self, _video: &Path, wav_out: &Path) -> Result<AudioStats, ExtractError> {
        tokio::fs::write(wav_out, b"RIFF")
            .await
            .map_err(|e| ExtractError::Failed(e.to_string()))?;
        Ok(AudioStats {
            rms: self.rms,
            duration_secs: self.duration_secs,
        })
    }
}
