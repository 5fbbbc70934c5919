use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("summarization timed out")]
    Timeout,
}

/// Text-in / text-out contract over the summarizing LLM provider.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, instruction: &str, text: &str) -> Result<String, SummarizeError>;

    /// Model identifier recorded in `summary.json`.
    fn model(&self) -> &str;
}
