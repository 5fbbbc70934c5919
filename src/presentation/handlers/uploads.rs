use std::io;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use bytes::Bytes;
use serde::Serialize;

use crate::infrastructure::observability::RequestId;
use crate::presentation::error::ApiError;
use crate::presentation::rate_limit::client_key;
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub file_type: String,
    pub file_hash: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Multipart upload, field `file`. The body is streamed to disk without
/// ever being buffered in memory.
pub async fn upload_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    if let Err(retry_after) = state.rate_limits.check_upload(&client_key(&headers)) {
        return Err(ApiError::too_many_requests(retry_after).with_request_id(&request_id));
    }

    let declared_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    // Skip unrelated fields; the upload is the `file` part.
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(
                    ApiError::bad_request("multipart field 'file' is required")
                        .with_request_id(&request_id),
                )
            }
            Err(e) => {
                return Err(
                    ApiError::bad_request(format!("failed to read multipart body: {}", e))
                        .with_request_id(&request_id),
                )
            }
        }
    };

    let declared_name = field.file_name().unwrap_or_default().to_string();
    let declared_mime = field.content_type().map(String::from);

    let stream = Box::pin(futures::stream::unfold(field, |mut field| async move {
        match field.chunk().await {
            Ok(Some(bytes)) => Some((Ok::<Bytes, io::Error>(bytes), field)),
            Ok(None) => None,
            Err(e) => Some((Err(io::Error::other(e.to_string())), field)),
        }
    }));

    let record = state
        .uploads
        .put(stream, &declared_name, declared_mime.as_deref(), declared_size)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&request_id))?;

    tracing::info!(
        file_id = %record.file_id,
        name = %record.original_name,
        "Upload accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id: record.file_id.to_string(),
            original_name: record.original_name,
            size: record.size,
            mime_type: record.mime_type,
            file_type: record.file_type.as_str().to_string(),
            file_hash: record.file_hash.to_string(),
            created_at: record.created_at.to_rfc3339(),
            expires_at: record.expires_at.to_rfc3339(),
        }),
    ))
}
