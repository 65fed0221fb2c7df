//! Error types for tenant resolution.

use crate::extract::TenantSignalSource;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use shopdesk_core::{Envelope, ErrorBody, ErrorKind};
use thiserror::Error;

/// Errors that can occur while resolving the tenant of a request.
///
/// Every variant is an `invalid_tenant_context` client error: the request
/// never proceeds with a default tenant.
///
/// ```rust
/// use shopdesk_tenant::TenantError;
///
/// let err = TenantError::Missing;
/// assert_eq!(err.status_code().as_u16(), 400);
/// assert_eq!(err.error_code(), "invalid_tenant_context");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
    /// No source carried a tenant.
    #[error("Tenant context required")]
    Missing,

    /// A source carried a value that is not a tenant id.
    #[error("Invalid tenant id in {signal}: {message}")]
    InvalidFormat {
        signal: TenantSignalSource,
        message: String,
    },

    /// The bearer token could not be verified or its claim is unusable.
    #[error("Invalid tenant claim: {0}")]
    InvalidClaim(String),

    /// Two sources named different tenants.
    #[error("Conflicting tenant signals: {other} disagrees with {winner}")]
    Conflicting {
        winner: TenantSignalSource,
        other: TenantSignalSource,
    },
}

impl TenantError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidTenantContext
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status()).unwrap_or(StatusCode::BAD_REQUEST)
    }

    /// Get the error code string for the envelope.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        self.kind().code()
    }

    /// Envelope error body for this failure.
    #[must_use]
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody::new(self.kind(), self.to_string())
    }
}

impl IntoResponse for TenantError {
    fn into_response(self) -> Response {
        let envelope: Envelope<Value> = Envelope::failure(self.to_error_body());
        (self.status_code(), Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_all_variants_are_bad_request() {
        let errors = [
            TenantError::Missing,
            TenantError::InvalidFormat {
                signal: TenantSignalSource::Header,
                message: "x".into(),
            },
            TenantError::InvalidClaim("expired".into()),
            TenantError::Conflicting {
                winner: TenantSignalSource::Claim,
                other: TenantSignalSource::Header,
            },
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(err.error_code(), "invalid_tenant_context");
        }
    }

    #[test]
    fn test_display_names_sources() {
        let err = TenantError::Conflicting {
            winner: TenantSignalSource::Claim,
            other: TenantSignalSource::Subdomain,
        };
        assert_eq!(
            err.to_string(),
            "Conflicting tenant signals: subdomain disagrees with claim"
        );
    }

    #[tokio::test]
    async fn test_into_response_is_enveloped() {
        let response = TenantError::Missing.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"], Value::Null);
        assert_eq!(json["errors"]["code"], "invalid_tenant_context");
        assert_eq!(json["errors"]["message"], "Tenant context required");
        assert!(json["meta"].is_object());
    }
}
