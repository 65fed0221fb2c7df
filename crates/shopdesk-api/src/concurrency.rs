//! Optimistic concurrency arbitration.
//!
//! Reads hand out the row version as a strong `ETag`. Writes must present it
//! back in `If-Match`; the arbiter locks the row inside the bound
//! transaction and compares the tokens byte for byte. There is no merge and
//! no tie-break: the first writer to commit wins, every other writer gets
//! `409 conflict` with the current version.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shopdesk_core::{Envelope, IfMatch, VersionToken};
use shopdesk_db::models::{bump_version, lock_version};
use shopdesk_db::{TenantTable, TenantTransaction};
use uuid::Uuid;

use crate::error::ApiError;

/// Parsed `If-Match` header of a write request.
///
/// Rejects with `428 precondition_required` when the header is missing,
/// blank or `*`.
#[derive(Debug, Clone)]
pub struct IfMatchHeader(pub IfMatch);

#[async_trait]
impl<S> FromRequestParts<S> for IfMatchHeader
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(header::IF_MATCH)
            .ok_or_else(|| ApiError::PreconditionRequired("If-Match header is required".into()))?
            .to_str()
            .map_err(|_| ApiError::Validation("If-Match header is not valid ASCII".into()))?;

        Ok(Self(IfMatch::parse(raw)?))
    }
}

/// Entry point for version-checked writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrencyArbiter;

impl ConcurrencyArbiter {
    /// Lock row `id` of `table` and check it against `presented`.
    ///
    /// # Errors
    ///
    /// * `ApiError::NotFound` if the row is not visible to the bound tenant
    /// * `ApiError::Conflict` if no presented tag matches the current version
    pub async fn acquire(
        tx: &mut TenantTransaction,
        table: TenantTable,
        id: Uuid,
        presented: &IfMatch,
    ) -> Result<VersionGuard, ApiError> {
        let current = lock_version(tx, table, id)
            .await?
            .ok_or(ApiError::NotFound)?;

        if !VersionToken::from_version(current).satisfies(presented) {
            tracing::info!(
                tenant_id = %tx.tenant_id(),
                table = %table,
                id = %id,
                current_version = current,
                "Stale If-Match rejected"
            );
            return Err(ApiError::Conflict { current });
        }

        Ok(VersionGuard {
            table,
            id,
            expected: current,
        })
    }
}

/// A row locked at a verified version.
///
/// Guarded writes use [`expected`](Self::expected) in their
/// `WHERE version = $n` clause; writes that do not touch `version`
/// themselves finish with [`advance`](Self::advance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct VersionGuard {
    table: TenantTable,
    id: Uuid,
    expected: i64,
}

impl VersionGuard {
    /// Version the write must start from.
    #[must_use]
    pub fn expected(&self) -> i64 {
        self.expected
    }

    /// Bump the version and return the new token.
    pub async fn advance(self, tx: &mut TenantTransaction) -> Result<VersionToken, ApiError> {
        let version = bump_version(tx, self.table, self.id, self.expected).await?;
        Ok(VersionToken::from_version(version))
    }
}

/// `ETag` header value for `token`.
#[must_use]
pub fn etag_header(token: &VersionToken) -> Option<HeaderValue> {
    HeaderValue::from_str(&token.etag()).ok()
}

/// Enveloped JSON body with an `ETag` header.
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    pub token: VersionToken,
    pub data: T,
}

impl<T> Tagged<T> {
    pub fn new(token: VersionToken, data: T) -> Self {
        Self { token, data }
    }
}

impl<T: Serialize> IntoResponse for Tagged<T> {
    fn into_response(self) -> Response {
        let mut response = Json(Envelope::ok(self.data)).into_response();
        if let Some(etag) = etag_header(&self.token) {
            response.headers_mut().insert(header::ETAG, etag);
        }
        response
    }
}
