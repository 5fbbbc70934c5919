use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;

use crate::application::ports::{TranscribeError, Transcriber};
use crate::domain::{SubtitleSegment, SubtitleTrack};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Whisper-style HTTP transcription client.
///
/// Sends the wav as multipart and accepts either a segment list with
/// timestamps or a bare `text` field. Transport errors are retried with
/// bounded exponential backoff; HTTP error statuses are not (the request is
/// not known to be idempotent on the server side).
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpTranscriber {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, TranscribeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscribeError::ApiRequestFailed(format!("client build: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionSegment {
    text: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    segments: Vec<TranscriptionSegment>,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<SubtitleTrack, TranscribeError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| TranscribeError::ApiRequestFailed(format!("read audio: {}", e)))?;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
            }

            let file_part = multipart::Part::bytes(bytes.clone())
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| TranscribeError::ApiRequestFailed(format!("mime: {}", e)))?;
            let form = multipart::Form::new()
                .part("file", file_part)
                .text("model", self.model.clone())
                .text("response_format", "verbose_json");

            tracing::debug!(endpoint = %self.endpoint, attempt, "Sending audio for transcription");

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    tracing::warn!(error = %e, attempt, "Transient transcription transport error");
                    last_err = Some(TranscribeError::ApiRequestFailed(e.to_string()));
                    continue;
                }
                Err(e) => return Err(TranscribeError::ApiRequestFailed(e.to_string())),
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(TranscribeError::ApiRequestFailed(format!(
                    "status {}: {}",
                    status, body
                )));
            }

            let parsed: TranscriptionResponse = response
                .json()
                .await
                .map_err(|e| TranscribeError::InvalidResponse(e.to_string()))?;

            let segments: Vec<SubtitleSegment> = if !parsed.segments.is_empty() {
                parsed
                    .segments
                    .into_iter()
                    .map(|s| {
                        SubtitleSegment::new(
                            s.text.trim(),
                            (s.start.max(0.0) * 1000.0) as u64,
                            (s.end.max(0.0) * 1000.0) as u64,
                        )
                    })
                    .collect()
            } else if let Some(text) = parsed.text.filter(|t| !t.trim().is_empty()) {
                vec![SubtitleSegment::new(text.trim(), 0, 0)]
            } else {
                Vec::new()
            };

            tracing::info!(segments = segments.len(), "Transcription completed");
            return Ok(SubtitleTrack::new(segments));
        }

        Err(last_err.unwrap_or(TranscribeError::Timeout))
    }
}
