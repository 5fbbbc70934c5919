use std::path::Path;

use async_trait::async_trait;

use crate::domain::SubtitleTrack;

#[derive(Debug, thiserror::Error)]
pub enum SubtitleParseError {
    /// No recognizable SRT/VTT/ASS header or structure.
    #[error("unsupported subtitle format: {0}")]
    UnsupportedFormat(String),
    /// Unrecoverable parse failure after best-effort recovery.
    #[error("malformed subtitle: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses a subtitle file into normalized segments.
#[async_trait]
pub trait SubtitleParser: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<SubtitleTrack, SubtitleParseError>;
}
