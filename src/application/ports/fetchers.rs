use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("remote content exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("fetch timed out")]
    Timeout,
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Downloads subtitle tracks advertised by a remote video source.
#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    /// Fetch the best available subtitle file into `dest_dir`. `Ok(None)`
    /// means the source advertises no usable subtitles; that is not an
    /// error, it sends the pipeline down the transcription branch.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<Option<PathBuf>, FetchError>;
}

/// Downloads the video itself, used only when subtitles are missing or
/// invalid.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        max_bytes: u64,
    ) -> Result<PathBuf, FetchError>;
}
