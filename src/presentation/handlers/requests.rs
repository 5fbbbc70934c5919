//! Shared request shapes and strict input validation for source-addressed
//! endpoints. Shape errors are rejected here, before any store work.

use std::str::FromStr;

use serde::Deserialize;

use crate::application::services::ResolvedSource;
use crate::domain::{FileHash, FileId, SourceType};
use crate::presentation::error::ApiError;
use crate::presentation::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SourceRequestBody {
    pub source_type: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_hash: Option<String>,
}

#[derive(Debug)]
pub enum ValidatedSource {
    Url(String),
    LocalById(FileId),
    LocalByHash(FileHash),
}

/// Structural checks return 400; cross-field constraint violations 422.
pub fn validate_source(body: &SourceRequestBody) -> Result<ValidatedSource, ApiError> {
    let source_type = SourceType::from_str(&body.source_type)
        .map_err(ApiError::bad_request)?;

    match source_type {
        SourceType::Url => {
            if body.file_id.is_some() || body.file_hash.is_some() {
                return Err(ApiError::unprocessable(
                    "source_type=url must not carry file_id or file_hash",
                ));
            }
            let url = body.source_url.as_deref().ok_or_else(|| {
                ApiError::unprocessable("source_type=url requires source_url")
            })?;
            let parsed = url::Url::parse(url)
                .map_err(|e| ApiError::bad_request(format!("invalid url: {}", e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ApiError::bad_request(format!(
                    "unsupported url scheme: {}",
                    parsed.scheme()
                )));
            }
            Ok(ValidatedSource::Url(url.to_string()))
        }
        SourceType::Local => {
            if body.source_url.is_some() {
                return Err(ApiError::unprocessable(
                    "source_type=local must not carry source_url",
                ));
            }
            match (body.file_id.as_deref(), body.file_hash.as_deref()) {
                (Some(_), Some(_)) | (None, None) => Err(ApiError::unprocessable(
                    "source_type=local requires exactly one of file_id or file_hash",
                )),
                (Some(id), None) => FileId::parse(id)
                    .map(ValidatedSource::LocalById)
                    .map_err(|e| ApiError::bad_request(e.to_string())),
                (None, Some(hash)) => FileHash::parse(hash)
                    .map(ValidatedSource::LocalByHash)
                    .map_err(|e| ApiError::bad_request(e.to_string())),
            }
        }
    }
}

/// Resolve a validated source to its cache identity. Local sources must
/// reference a live upload.
pub async fn resolve_source(
    state: &AppState,
    validated: ValidatedSource,
) -> Result<ResolvedSource, ApiError> {
    match validated {
        ValidatedSource::Url(url) => Ok(state.cache.resolve_url(&url).await?),
        ValidatedSource::LocalById(file_id) => {
            let record = state.uploads.get(&file_id).await?;
            Ok(state
                .cache
                .resolve_local(&record.file_hash, Some(record.original_name)))
        }
        ValidatedSource::LocalByHash(file_hash) => {
            let record = state.uploads.get_by_hash(&file_hash).await?;
            Ok(state
                .cache
                .resolve_local(&record.file_hash, Some(record.original_name)))
        }
    }
}
