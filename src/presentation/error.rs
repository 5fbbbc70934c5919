use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::application::services::{CacheServiceError, UploadError};
use crate::infrastructure::observability::RequestId;

/// Machine-readable error codes of the service taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    UnsupportedType,
    TooLarge,
    Timeout,
    TooManyRequests,
    Upstream,
    Cancelled,
    Interrupted,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::UnsupportedType => "unsupported-type",
            ErrorCode::TooLarge => "too-large",
            ErrorCode::Timeout => "timeout",
            ErrorCode::TooManyRequests => "too-many-requests",
            ErrorCode::Upstream => "upstream",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Interrupted => "interrupted",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Uniform error envelope returned on every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub message: String,
    pub code: &'static str,
    pub status: u16,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub errors: Option<serde_json::Value>,
    pub retry_after_secs: Option<u64>,
    request_id: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            detail: None,
            errors: None,
            retry_after_secs: None,
            request_id: String::new(),
        }
    }

    /// Structurally malformed input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidArgument, message)
    }

    /// Well-formed input violating a cross-field constraint.
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InvalidArgument,
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::TooManyRequests,
            format!("rate limit exceeded, retry after {}s", retry_after_secs),
        );
        err.retry_after_secs = Some(retry_after_secs);
        err
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Internal,
            message,
        )
    }

    pub fn with_request_id(mut self, request_id: &RequestId) -> Self {
        self.request_id = request_id.0.clone();
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            message: self.message,
            code: self.code.as_str(),
            status: self.status.as_u16(),
            request_id: self.request_id,
            detail: self.detail,
            errors: self.errors,
        };

        let mut response = (self.status, Json(envelope)).into_response();
        if let Some(retry) = self.retry_after_secs {
            if let Ok(value) = retry.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidArgument(msg) => ApiError::bad_request(msg),
            UploadError::UnsupportedType(msg) => ApiError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorCode::UnsupportedType,
                format!("unsupported file type: {}", msg),
            ),
            UploadError::TooLarge { limit } => ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorCode::TooLarge,
                format!("file exceeds the {} byte limit", limit),
            ),
            UploadError::Timeout => ApiError::new(
                StatusCode::REQUEST_TIMEOUT,
                ErrorCode::Timeout,
                "upload timed out",
            ),
            UploadError::TooManyRequests { retry_after_secs } => {
                ApiError::too_many_requests(retry_after_secs)
            }
            UploadError::NotFound(what) => ApiError::not_found(format!("file not found: {}", what)),
            UploadError::Store(e) => ApiError::internal(e.to_string()),
            UploadError::Storage(e) => ApiError::internal(e),
        }
    }
}

impl From<CacheServiceError> for ApiError {
    fn from(err: CacheServiceError) -> Self {
        match err {
            CacheServiceError::InvalidArgument(msg) => ApiError::bad_request(msg),
            CacheServiceError::NotFound(what) => ApiError::not_found(what),
            CacheServiceError::Store(e) => ApiError::internal(e.to_string()),
            CacheServiceError::Bundle(e) => ApiError::internal(e.to_string()),
        }
    }
}
