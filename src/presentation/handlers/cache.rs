use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Serialize;

use crate::domain::CacheKey;
use crate::infrastructure::observability::RequestId;
use crate::presentation::error::ApiError;
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct CacheEntryResponse {
    pub cache_key: String,
    pub source_type: String,
    pub source_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    pub status: String,
    pub profile_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

#[derive(Serialize)]
pub struct CacheDeleteResponse {
    pub cache_key: String,
    pub deleted: bool,
}

pub async fn cache_entry_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(cache_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cache_key = CacheKey::parse(&cache_key)
        .map_err(|e| ApiError::bad_request(e.to_string()).with_request_id(&request_id))?;

    let Some(entry) = state
        .cache
        .get_entry(&cache_key)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?
    else {
        return Err(ApiError::not_found(format!("cache entry not found: {}", cache_key))
            .with_request_id(&request_id));
    };

    let response = CacheEntryResponse {
        cache_key: entry.cache_key.to_string(),
        source_type: entry.source_type.as_str().to_string(),
        source_ref: entry.source_ref,
        source_name: entry.source_name,
        status: entry.status.as_str().to_string(),
        profile_version: entry.profile_version,
        summary_text: entry.summary_text,
        bundle_path: entry.bundle_path,
        error: entry.error,
        created_at: entry.created_at.to_rfc3339(),
        updated_at: entry.updated_at.to_rfc3339(),
        last_accessed: entry.last_accessed.map(|t| t.to_rfc3339()),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Delete an entry: cancels in-flight work for the key, removes the bundle
/// directory and the rows.
pub async fn cache_delete_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(cache_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cache_key = CacheKey::parse(&cache_key)
        .map_err(|e| ApiError::bad_request(e.to_string()).with_request_id(&request_id))?;

    state.cancels.cancel(&cache_key);

    let deleted = state
        .cache
        .delete(&cache_key)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    if !deleted {
        return Err(ApiError::not_found(format!("cache entry not found: {}", cache_key))
            .with_request_id(&request_id));
    }

    Ok((
        StatusCode::OK,
        Json(CacheDeleteResponse {
            cache_key: cache_key.to_string(),
            deleted: true,
        }),
    ))
}
