//! Idempotent replay for write endpoints.
//!
//! A write carrying `Idempotency-Key` claims the key inside the same tenant
//! transaction as the business write and stores its response before commit.
//! A retry with the same key and the same body gets the stored response
//! back without running the handler; a retry with a different body is
//! refused with `409 idempotency_key_conflict`.
//!
//! ```rust,ignore
//! async fn create_invoice(
//!     State(cache): State<IdempotencyCache>,
//!     binder: TenantBinder,
//!     request: IdempotentRequest,
//! ) -> ApiResult<Response> {
//!     let mut tx = binder.begin().await?;
//!     let claim = match cache.admit(&mut tx, &request).await? {
//!         Admission::Replay(response) => return Ok(response),
//!         Admission::Proceed(claim) => claim,
//!     };
//!     let input: CreateInvoice = request.json()?;
//!     let invoice = Invoice::create(&mut tx, &input).await?;
//!     let response = finish(claim, &mut tx, StatusCode::CREATED, &Envelope::ok(invoice)).await?;
//!     tx.commit().await?;
//!     Ok(response)
//! }
//! ```

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, MatchedPath, Request},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shopdesk_core::VersionToken;
use sha2::{Digest, Sha256};
use shopdesk_db::models::{
    ClaimOutcome, IdempotencyRecord, IdempotencyScope, ReplayDecision, StoredResponse,
    IDEMPOTENCY_TTL_HOURS,
};
use shopdesk_db::TenantTransaction;
use uuid::Uuid;

use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const IDEMPOTENCY_STATUS_HEADER: &str = "x-idempotency-status";
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Client-chosen key: 1 to 255 visible ASCII characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if raw.is_empty() || raw.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ApiError::Validation(format!(
                "Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ApiError::Validation(
                "Idempotency-Key must contain visible ASCII characters only".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ApiError> {
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| {
                        ApiError::Validation("Idempotency-Key must be visible ASCII".into())
                    })
                    .and_then(Self::parse)
            })
            .transpose()
    }
}

/// SHA-256 hex digest identifying a request body.
///
/// JSON bodies are hashed in canonical form (object keys sorted, no
/// insignificant whitespace) so that re-serialized retries still match.
/// Anything else is hashed byte for byte.
#[must_use]
pub fn request_hash(is_json: bool, body: &[u8]) -> String {
    let canonical = if is_json {
        serde_json::from_slice::<Value>(body)
            .ok()
            .map(|value| canonical_json(&value))
    } else {
        None
    };

    let mut hasher = Sha256::new();
    match canonical {
        Some(text) => hasher.update(text.as_bytes()),
        None => hasher.update(body),
    }
    hex::encode(hasher.finalize())
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// A write request with its body buffered and hashed.
#[derive(Debug, Clone)]
pub struct IdempotentRequest {
    key: Option<IdempotencyKey>,
    route: String,
    request_hash: String,
    body: Bytes,
}

impl IdempotentRequest {
    #[must_use]
    pub fn key(&self) -> Option<&IdempotencyKey> {
        self.key.as_ref()
    }

    /// `"{METHOD} {route template}"`.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    #[must_use]
    pub fn request_hash(&self) -> &str {
        &self.request_hash
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::Validation(format!("Invalid request body: {e}")))
    }

    /// Identity under which the response is stored, if a key was sent.
    #[must_use]
    pub fn scope(&self) -> Option<IdempotencyScope> {
        self.key.as_ref().map(|key| IdempotencyScope {
            route: self.route.clone(),
            idempotency_key: key.as_str().to_string(),
            request_hash: self.request_hash.clone(),
        })
    }
}

#[async_trait]
impl<S> FromRequest<S> for IdempotentRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let key = IdempotencyKey::from_headers(req.headers()).map_err(IntoResponse::into_response)?;
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| req.uri().path().to_string(), |p| p.as_str().to_string());
        let route = format!("{} {}", req.method(), path);
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("application/json"));

        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let request_hash = request_hash(is_json, &body);

        Ok(Self {
            key,
            route,
            request_hash,
            body,
        })
    }
}

/// Outcome of [`IdempotencyCache::admit`].
#[derive(Debug)]
pub enum Admission {
    /// Run the handler. Holds the claim when the request carried a key.
    Proceed(Option<IdempotencyClaim>),
    /// Stored response of an earlier identical request.
    Replay(Response),
}

/// Ownership of a key for the current transaction.
#[derive(Debug)]
#[must_use]
pub struct IdempotencyClaim {
    record_id: Uuid,
}

impl IdempotencyClaim {
    /// Store the response for replay. Must run before commit.
    pub async fn record(
        self,
        tx: &mut TenantTransaction,
        response: &StoredResponse,
    ) -> Result<(), ApiError> {
        IdempotencyRecord::complete(tx, self.record_id, response).await?;
        Ok(())
    }
}

/// Idempotency settings shared by write handlers.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyCache {
    ttl: Duration,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(Duration::hours(IDEMPOTENCY_TTL_HOURS))
    }
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Apply the decision table to `request`.
    pub async fn admit(
        &self,
        tx: &mut TenantTransaction,
        request: &IdempotentRequest,
    ) -> Result<Admission, ApiError> {
        let Some(scope) = request.scope() else {
            return Ok(Admission::Proceed(None));
        };

        let (record, observed_at) = match IdempotencyRecord::claim(tx, &scope, self.ttl).await? {
            ClaimOutcome::Claimed(record) => {
                return Ok(Admission::Proceed(Some(IdempotencyClaim {
                    record_id: record.id,
                })));
            }
            ClaimOutcome::Existing {
                record,
                observed_at,
            } => (record, observed_at),
        };

        // Expiry is judged on the database clock that wrote `expires_at`.
        match record.decide(&scope.request_hash, observed_at) {
            ReplayDecision::Replay(stored) => {
                tracing::info!(
                    tenant_id = %tx.tenant_id(),
                    route = %scope.route,
                    status = stored.status,
                    "Idempotent request replayed"
                );
                Ok(Admission::Replay(replay_response(stored)))
            }
            ReplayDecision::KeyConflict => {
                tracing::warn!(
                    tenant_id = %tx.tenant_id(),
                    route = %scope.route,
                    "Idempotency key reused with a different body"
                );
                Err(ApiError::IdempotencyKeyConflict(
                    "Idempotency key was already used with a different request body".into(),
                ))
            }
            ReplayDecision::Execute => {
                // The claim takes over expired rows, so an expired record
                // here means the row changed between claim and read.
                tracing::warn!(
                    tenant_id = %tx.tenant_id(),
                    route = %scope.route,
                    record_id = %record.id,
                    expires_at = %record.expires_at,
                    observed_at = %observed_at,
                    "Expired idempotency record survived its claim"
                );
                Err(ApiError::IdempotencyKeyConflict(
                    "A request with this idempotency key has not completed".into(),
                ))
            }
            ReplayDecision::Incomplete => {
                Err(ApiError::IdempotencyKeyConflict(
                    "A request with this idempotency key has not completed".into(),
                ))
            }
        }
    }
}

/// Build the JSON response of a write, storing it first when `claim` is set.
pub async fn finish<T: Serialize>(
    claim: Option<IdempotencyClaim>,
    tx: &mut TenantTransaction,
    status: StatusCode,
    body: &T,
) -> Result<Response, ApiError> {
    finish_with_etag(claim, tx, status, None, body).await
}

/// Like [`finish`] for versioned writes: the new `token` is sent as `ETag`
/// and stored with the response, so a replay carries it too.
pub async fn finish_tagged<T: Serialize>(
    claim: Option<IdempotencyClaim>,
    tx: &mut TenantTransaction,
    status: StatusCode,
    token: &VersionToken,
    body: &T,
) -> Result<Response, ApiError> {
    finish_with_etag(claim, tx, status, Some(token.etag()), body).await
}

async fn finish_with_etag<T: Serialize>(
    claim: Option<IdempotencyClaim>,
    tx: &mut TenantTransaction,
    status: StatusCode,
    etag: Option<String>,
    body: &T,
) -> Result<Response, ApiError> {
    let bytes = serde_json::to_vec(body)
        .map_err(|e| ApiError::Internal(format!("response serialization failed: {e}")))?;

    let marker = match claim {
        Some(claim) => {
            let stored = StoredResponse {
                status: status.as_u16(),
                body: bytes.clone(),
                content_type: Some("application/json".into()),
                etag: etag.clone(),
            };
            claim.record(tx, &stored).await?;
            Some("original")
        }
        None => None,
    };

    let mut response = (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response();
    if let Some(marker) = marker {
        response
            .headers_mut()
            .insert(IDEMPOTENCY_STATUS_HEADER, HeaderValue::from_static(marker));
    }
    if let Some(etag) = etag.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

fn replay_response(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(stored.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Some(ct) = stored
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, ct);
    }
    if let Some(etag) = stored.etag.as_deref().and_then(|e| HeaderValue::from_str(e).ok()) {
        headers.insert(header::ETAG, etag);
    }
    headers.insert(IDEMPOTENCY_STATUS_HEADER, HeaderValue::from_static("replayed"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_core::ErrorKind;

    #[test]
    fn test_key_bounds() {
        assert!(IdempotencyKey::parse("abc123").is_ok());
        assert!(IdempotencyKey::parse(&"k".repeat(255)).is_ok());
        assert!(IdempotencyKey::parse(&"k".repeat(256)).is_err());
        assert!(IdempotencyKey::parse("").is_err());
        assert!(IdempotencyKey::parse("has space").is_err());
        assert!(IdempotencyKey::parse("tab\tkey").is_err());
    }

    #[test]
    fn test_key_rejection_is_validation() {
        let err = IdempotencyKey::parse("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_hash_ignores_key_order_and_whitespace() {
        let a = request_hash(true, br#"{"total_cents": 100, "customer_id": "c", "x": {"b": 1, "a": 2}}"#);
        let b = request_hash(true, br#"{"x":{"a":2,"b":1},"customer_id":"c","total_cents":100}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_distinguishes_values() {
        let a = request_hash(true, br#"{"total_cents": 100}"#);
        let b = request_hash(true, br#"{"total_cents": 101}"#);
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_json_hashed_raw() {
        let a = request_hash(false, b"{\"a\":1}");
        let b = request_hash(false, b"{ \"a\": 1 }");
        assert_ne!(a, b);
        // Unparsable JSON falls back to the raw bytes.
        assert_eq!(request_hash(true, b"not json"), request_hash(false, b"not json"));
    }

    #[test]
    fn test_canonical_json_escapes_keys() {
        let value: Value = serde_json::from_str(r#"{"a\"b": [1, {"z": null, "y": true}]}"#).unwrap();
        assert_eq!(canonical_json(&value), r#"{"a\"b":[1,{"y":true,"z":null}]}"#);
    }

    #[test]
    fn test_replay_response_restores_status_and_body() {
        let response = replay_response(StoredResponse {
            status: 201,
            body: br#"{"data":{"number":"INV-1"},"errors":null,"meta":{"request_id":null}}"#.to_vec(),
            content_type: Some("application/json".into()),
            etag: None,
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[IDEMPOTENCY_STATUS_HEADER], "replayed");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(response.headers().get(header::ETAG).is_none());
    }

    #[test]
    fn test_replay_response_restores_etag() {
        let response = replay_response(StoredResponse {
            status: 200,
            body: br#"{"data":{"status":"confirmed"},"errors":null,"meta":{"request_id":null}}"#
                .to_vec(),
            content_type: Some("application/json".into()),
            etag: Some(VersionToken::from_version(4).etag()),
        });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ETAG], "\"v4\"");
        assert_eq!(response.headers()[IDEMPOTENCY_STATUS_HEADER], "replayed");
    }

    #[test]
    fn test_default_ttl() {
        assert_eq!(IdempotencyCache::default().ttl(), Duration::hours(24));
    }
}
