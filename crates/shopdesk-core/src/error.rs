//! Error Taxonomy
//!
//! Every failure that reaches a client is classified into one [`ErrorKind`].
//! The kind fixes the stable machine-readable code, the HTTP status and
//! whether the client may retry.
//!
//! ```
//! use shopdesk_core::ErrorKind;
//!
//! assert_eq!(ErrorKind::PolicyDenied.status(), 404);
//! assert_eq!(ErrorKind::PolicyDenied.code(), "not_found");
//! assert!(ErrorKind::RateLimited.is_retryable());
//! ```

use crate::ids::TenantId;
use serde::Serialize;
use thiserror::Error;

/// Stable error classes shared by every shopdesk crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Tenant signal missing, malformed or contradictory. HTTP 400.
    InvalidTenantContext,
    /// The storage policy refused the row. Reported as 404 so that rows of
    /// other tenants are indistinguishable from absent rows.
    PolicyDenied,
    /// Resource does not exist for the bound tenant. HTTP 404.
    NotFound,
    /// Presented version token does not match the current one. HTTP 409.
    Conflict,
    /// Conditional header required but not supplied. HTTP 428.
    PreconditionRequired,
    /// Idempotency key reused with a different payload. HTTP 409.
    IdempotencyKeyConflict,
    /// Tenant exceeded its request budget. HTTP 429.
    RateLimited,
    /// Pool or connection failure. HTTP 503.
    StorageUnavailable,
    /// Request input failed validation. HTTP 400.
    Validation,
    /// Anything else. HTTP 500.
    Internal,
}

impl ErrorKind {
    /// Machine-readable code placed in `errors.code`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTenantContext => "invalid_tenant_context",
            Self::PolicyDenied | Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PreconditionRequired => "precondition_required",
            Self::IdempotencyKeyConflict => "idempotency_key_conflict",
            Self::RateLimited => "rate_limited",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Validation => "validation_error",
            Self::Internal => "internal_error",
        }
    }

    /// HTTP status code for this kind.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidTenantContext | Self::Validation => 400,
            Self::PolicyDenied | Self::NotFound => 404,
            Self::Conflict | Self::IdempotencyKeyConflict => 409,
            Self::PreconditionRequired => 428,
            Self::RateLimited => 429,
            Self::StorageUnavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Whether the same request may succeed if sent again later.
    ///
    /// `Conflict` is not retryable as-is: the client has to refetch first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::StorageUnavailable)
    }

    /// Default human-readable message used when the producer gives none.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::InvalidTenantContext => "A valid tenant context is required",
            Self::PolicyDenied | Self::NotFound => "Resource not found",
            Self::Conflict => "etag_mismatch",
            Self::PreconditionRequired => "if_match_required",
            Self::IdempotencyKeyConflict => {
                "Idempotency key was already used with a different request body"
            }
            Self::RateLimited => "Too many requests",
            Self::StorageUnavailable => "Storage temporarily unavailable",
            Self::Validation => "Request validation failed",
            Self::Internal => "Internal server error",
        }
    }

    /// Best-effort code for a bare HTTP status produced outside this taxonomy
    /// (framework rejections, body limits, unknown routes).
    #[must_use]
    pub fn code_for_status(status: u16) -> &'static str {
        match status {
            400 | 422 => Self::Validation.code(),
            401 => "unauthorized",
            403 => "forbidden",
            404 => Self::NotFound.code(),
            405 => "method_not_allowed",
            409 => Self::Conflict.code(),
            413 => "payload_too_large",
            415 => "unsupported_media_type",
            428 => Self::PreconditionRequired.code(),
            429 => Self::RateLimited.code(),
            502..=504 => Self::StorageUnavailable.code(),
            400..=499 => "bad_request",
            _ => Self::Internal.code(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A row was loaded whose owner is not the tenant bound to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Tenant mismatch: expected {expected}, got {actual}")]
pub struct TenantMismatch {
    /// Tenant bound to the current request
    pub expected: TenantId,
    /// Tenant recorded on the row
    pub actual: TenantId,
}

impl TenantMismatch {
    /// Mismatches surface to clients as a policy denial.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PolicyDenied
    }
}
