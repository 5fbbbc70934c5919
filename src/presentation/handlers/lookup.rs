use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Serialize;

use crate::infrastructure::observability::RequestId;
use crate::presentation::error::ApiError;
use crate::presentation::handlers::requests::{resolve_source, validate_source, SourceRequestBody};
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct LookupResponse {
    pub hit: bool,
    pub status: String,
    pub cache_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Read-only cache probe: never creates work, never touches access times.
pub async fn lookup_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<SourceRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let validated = validate_source(&body).map_err(|e| e.with_request_id(&request_id))?;
    let source = resolve_source(&state, validated)
        .await
        .map_err(|e| e.with_request_id(&request_id))?;

    let result = state
        .cache
        .lookup(&source, false)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    let response = LookupResponse {
        hit: result.hit,
        status: result
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "not_found".to_string()),
        cache_key: result.cache_key.to_string(),
        source_name: result.source_name,
        summary_text: result.summary_text,
        bundle_path: result.bundle_path,
        job_id: result.job_id.map(|j| j.to_string()),
        error: result.error,
        created_at: result.created_at.map(|t| t.to_rfc3339()),
        updated_at: result.updated_at.map(|t| t.to_rfc3339()),
    };

    Ok((StatusCode::OK, Json(response)))
}
