use std::path::Path;

use async_trait::async_trait;

/// Measurements taken while extracting the audio track.
#[derive(Debug, Clone, Copy)]
pub struct AudioStats {
    /// Root-mean-square amplitude of the decoded samples, normalized to
    /// [0, 1]. Used by the silence heuristic.
    pub rms: f32,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("media tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error("extraction failed: {0}")]
    Failed(String),
    #[error("extraction timed out")]
    Timeout,
}

/// Extracts a mono 16 kHz wav from a video file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_wav(&self, video: &Path, wav_out: &Path) -> Result<AudioStats, ExtractError>;
}
