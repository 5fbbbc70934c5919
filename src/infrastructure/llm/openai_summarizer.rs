use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::ports::{SummarizeError, Summarizer};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// OpenAI-compatible chat-completions summarizer.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiSummarizer {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, SummarizeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SummarizeError::ApiRequestFailed(format!("client build: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, instruction: &str, text: &str) -> Result<String, SummarizeError> {
        let content = format!("{}\n\n{}", instruction, text);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You summarize video content faithfully and concisely.",
                },
                ChatMessage {
                    role: "user",
                    content: &content,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    tracing::warn!(error = %e, attempt, "Transient summarizer transport error");
                    last_err = Some(SummarizeError::ApiRequestFailed(e.to_string()));
                    continue;
                }
                Err(e) => return Err(SummarizeError::ApiRequestFailed(e.to_string())),
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(attempt, "Summarizer rate limited");
                last_err = Some(SummarizeError::RateLimited);
                continue;
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(SummarizeError::ApiRequestFailed(format!(
                    "status {}: {}",
                    status, body
                )));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| SummarizeError::InvalidResponse(e.to_string()))?;

            let summary = parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| SummarizeError::InvalidResponse("no choices".to_string()))?;

            tracing::debug!(chars = summary.len(), "Summary generated");
            return Ok(summary);
        }

        Err(last_err.unwrap_or(SummarizeError::Timeout))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
