//! Error type for shopdesk HTTP handlers and middleware.
//!
//! Every variant maps to one [`ErrorKind`]; the response is always the
//! envelope with `data: null` and a populated `errors` block.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shopdesk_core::{Envelope, ErrorBody, ErrorKind, IfMatchError, VersionToken};
use shopdesk_db::DbError;
use shopdesk_tenant::TenantError;
use thiserror::Error;

/// Seconds a client should wait before retrying a storage failure.
pub const STORAGE_RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("Resource not found")]
    NotFound,

    #[error("Version conflict: current version is {current}")]
    Conflict { current: i64 },

    #[error("If-Match required: {0}")]
    PreconditionRequired(String),

    #[error("Idempotency key conflict: {0}")]
    IdempotencyKeyConflict(String),

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage unavailable")]
    StorageUnavailable(#[source] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for shopdesk handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Tenant(e) => e.kind(),
            Self::NotFound => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::PreconditionRequired(_) => ErrorKind::PreconditionRequired,
            Self::IdempotencyKeyConflict(_) => ErrorKind::IdempotencyKeyConflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Validation(_) => ErrorKind::Validation,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    fn error_body(&self) -> ErrorBody {
        match self {
            Self::Tenant(e) => e.to_error_body(),
            Self::Conflict { current } => ErrorBody::from_kind(ErrorKind::Conflict)
                .with_details(json!({ "current_version": VersionToken::from_version(*current).as_str() })),
            Self::PreconditionRequired(_) => ErrorBody::from_kind(ErrorKind::PreconditionRequired),
            Self::IdempotencyKeyConflict(msg) | Self::Validation(msg) => {
                ErrorBody::new(self.kind(), msg.clone())
            }
            Self::RateLimited { retry_after } => ErrorBody::from_kind(ErrorKind::RateLimited)
                .with_details(json!({ "retry_after": retry_after })),
            Self::NotFound | Self::StorageUnavailable(_) | Self::Internal(_) => {
                ErrorBody::from_kind(self.kind())
            }
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::StorageUnavailable(_) => Some(STORAGE_RETRY_AFTER_SECS),
            _ => None,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::VersionConflict { current } => Self::Conflict { current },
            DbError::NotFound(_) | DbError::PolicyDenied(_) => Self::NotFound,
            DbError::ValidationFailed(msg) => Self::Validation(msg),
            DbError::TenantContextMissing => Self::Tenant(TenantError::Missing),
            e if e.is_retryable() => Self::StorageUnavailable(e),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<IfMatchError> for ApiError {
    fn from(err: IfMatchError) -> Self {
        match err {
            IfMatchError::Malformed(msg) => Self::Validation(format!("Malformed If-Match: {msg}")),
            other => Self::PreconditionRequired(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        match &self {
            Self::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
            Self::StorageUnavailable(e) => tracing::error!(error = %e, "Storage unavailable"),
            _ => tracing::debug!(code = kind.code(), error = %self, "Request failed"),
        }

        let status =
            StatusCode::from_u16(kind.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(Envelope::<()>::failure(self.error_body()))).into_response();

        let headers = response.headers_mut();
        if let Some(secs) = self.retry_after() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Self::Conflict { current } = &self {
            if let Ok(etag) = HeaderValue::from_str(&VersionToken::from_version(*current).etag()) {
                headers.insert(header::ETAG, etag);
            }
        }
        response
    }
}
