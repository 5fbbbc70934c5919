use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Serialize;

use crate::domain::JobId;
use crate::infrastructure::observability::RequestId;
use crate::presentation::error::ApiError;
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub cache_key: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// Job status polling; carries the joined cache state so clients do not
/// need a second request once the job completes.
pub async fn job_status_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::parse(&job_id)
        .map_err(|e| ApiError::bad_request(e.to_string()).with_request_id(&request_id))?;

    let Some((job, entry)) = state
        .cache
        .get_job(&job_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?
    else {
        return Err(
            ApiError::not_found(format!("job not found: {}", job_id)).with_request_id(&request_id),
        );
    };

    let response = JobStatusResponse {
        job_id: job.job_id.to_string(),
        cache_key: job.cache_key.to_string(),
        status: job.status.as_str().to_string(),
        error: job.error,
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
        cache_status: entry.as_ref().map(|e| e.status.as_str().to_string()),
        summary_text: entry.as_ref().and_then(|e| e.summary_text.clone()),
        source_name: entry.as_ref().and_then(|e| e.source_name.clone()),
    };

    Ok((StatusCode::OK, Json(response)))
}
