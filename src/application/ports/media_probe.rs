use async_trait::async_trait;

/// Metadata extracted from a remote video source without downloading it.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    /// Site extractor name (e.g. "youtube"), lowercase.
    pub extractor: Option<String>,
    /// Site-scoped stable video id.
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
    pub has_subtitles: bool,
}

impl SourceProbe {
    /// The `(extractor, video_id)` pair, when both are present.
    pub fn identity(&self) -> Option<(&str, &str)> {
        match (self.extractor.as_deref(), self.video_id.as_deref()) {
            (Some(e), Some(v)) if !e.is_empty() && !v.is_empty() => Some((e, v)),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe failed: {0}")]
    Failed(String),
    #[error("probe timed out")]
    Timeout,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<SourceProbe, ProbeError>;
}
