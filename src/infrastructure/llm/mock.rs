//! Mock summarizer for tests.

use async_trait::async_trait;

use crate::application::ports::{SummarizeError, Summarizer};

/// Echoes a deterministic summary derived from the input.
pub struct MockSummarizer {
    pub fail: bool,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, _instruction: &str, text: &str) -> Result<String, SummarizeError> {
        if self.fail {
            return Err(SummarizeError::ApiRequestFailed(
                "mock summarizer failure".to_string(),
            ));
        }
        let head: String = text.chars().take(64).collect();
        Ok(format!("Summary: {}", head.trim()))
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
