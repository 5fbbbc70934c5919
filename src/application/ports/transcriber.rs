use std::path::Path;

use async_trait::async_trait;

use crate::domain::SubtitleTrack;

#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("transcription timed out")]
    Timeout,
}

/// Speech-to-text over a wav file. Only the contract is owned here; the
/// engines behind it are external services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<SubtitleTrack, TranscribeError>;
}
