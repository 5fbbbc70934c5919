use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::application::ports::GetOrCreateOutcome;
use crate::infrastructure::observability::RequestId;
use crate::presentation::error::ApiError;
use crate::presentation::handlers::requests::{resolve_source, validate_source, SourceRequestBody};
use crate::presentation::rate_limit::client_key;
use crate::presentation::state::AppState;

#[derive(Deserialize)]
pub struct SummaryRequestBody {
    #[serde(flatten)]
    pub source: SourceRequestBody,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub status: String,
    pub cache_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
}

/// Get-or-create a summary. Completed and failed entries return 200 as
/// terminal results; in-flight or freshly enqueued work returns 202.
pub async fn summaries_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<SummaryRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    if let Err(retry_after) = state.rate_limits.check_summary(&client_key(&headers)) {
        return Err(ApiError::too_many_requests(retry_after).with_request_id(&request_id));
    }

    let validated = validate_source(&body.source).map_err(|e| e.with_request_id(&request_id))?;
    let source = resolve_source(&state, validated)
        .await
        .map_err(|e| e.with_request_id(&request_id))?;

    let outcome = state
        .cache
        .get_or_create(&source, body.refresh)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    let (status_code, response) = match outcome {
        GetOrCreateOutcome::Hit(entry) => (
            StatusCode::OK,
            SummaryResponse {
                status: entry.status.as_str().to_string(),
                cache_key: entry.cache_key.to_string(),
                job_id: None,
                summary_text: entry.summary_text,
                source_name: entry.source_name,
                error: None,
                created_at: entry.created_at.to_rfc3339(),
            },
        ),
        GetOrCreateOutcome::Failed(entry) => (
            StatusCode::OK,
            SummaryResponse {
                status: entry.status.as_str().to_string(),
                cache_key: entry.cache_key.to_string(),
                job_id: None,
                summary_text: None,
                source_name: entry.source_name,
                error: entry.error,
                created_at: entry.created_at.to_rfc3339(),
            },
        ),
        GetOrCreateOutcome::InFlight { entry, job } => (
            StatusCode::ACCEPTED,
            SummaryResponse {
                status: entry.status.as_str().to_string(),
                cache_key: entry.cache_key.to_string(),
                job_id: Some(job.job_id.to_string()),
                summary_text: None,
                source_name: entry.source_name,
                error: None,
                created_at: entry.created_at.to_rfc3339(),
            },
        ),
        GetOrCreateOutcome::Enqueue { entry, job } => {
            state.queue.enqueue(job.job_id.clone());
            tracing::info!(
                cache_key = %entry.cache_key,
                job_id = %job.job_id,
                "Summary job enqueued"
            );
            (
                StatusCode::ACCEPTED,
                SummaryResponse {
                    status: entry.status.as_str().to_string(),
                    cache_key: entry.cache_key.to_string(),
                    job_id: Some(job.job_id.to_string()),
                    summary_text: None,
                    source_name: entry.source_name,
                    error: None,
                    created_at: entry.created_at.to_rfc3339(),
                },
            )
        }
    };

    Ok((status_code, Json(response)))
}
