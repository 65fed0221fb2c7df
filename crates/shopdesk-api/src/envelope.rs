//! Response envelope middleware.
//!
//! Buffers every JSON response (and every error response) and rewrites it
//! with [`shopdesk_core::normalize`]. Pagination parameters come from the
//! request's `page` / `page_size` query, the request id from `X-Request-Id`.
//! Non-JSON successes such as files or `204 No Content` pass through.

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use shopdesk_core::{normalize, PageParams};

use crate::error::ApiError;

/// Header carrying the request id, set by `tower-http` before this layer.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest response body the normalizer will buffer.
pub const MAX_NORMALIZED_BODY: usize = 16 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
struct RawPageQuery {
    page: Option<String>,
    page_size: Option<String>,
}

/// Pagination parameters of a request URI. Never fails.
#[must_use]
pub fn page_params(uri: &Uri) -> PageParams {
    let raw = Query::<RawPageQuery>::try_from_uri(uri)
        .map(|Query(raw)| raw)
        .unwrap_or_default();
    PageParams::from_raw(raw.page.as_deref(), raw.page_size.as_deref())
}

/// Request id of a request or response, if any.
#[must_use]
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Axum middleware wrapping responses in the envelope.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/customers", get(list_customers))
///     .layer(axum::middleware::from_fn(envelope_middleware));
/// ```
pub async fn envelope_middleware(req: Request, next: Next) -> Response {
    let params = page_params(req.uri());
    let request_id = request_id(req.headers());

    let response = next.run(req).await;
    normalize_response(response, &params, request_id.as_deref()).await
}

/// Rewrite one response into the envelope.
pub async fn normalize_response(
    response: Response,
    params: &PageParams,
    request_id: Option<&str>,
) -> Response {
    let status = response.status();
    if matches!(status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED) {
        return response;
    }

    let json = is_json(response.headers());
    if !json && !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_NORMALIZED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return ApiError::Internal(format!("response body could not be buffered: {e}"))
                .into_response();
        }
    };

    let value = if json {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => value,
            Err(_) if status.is_success() => {
                // Not actually JSON; hand it back untouched.
                return Response::from_parts(parts, Body::from(bytes));
            }
            Err(_) => text_body(&bytes),
        }
    } else {
        text_body(&bytes)
    };

    let normalized = normalize(status.as_u16(), value, params, request_id);
    let encoded = match serde_json::to_vec(&normalized) {
        Ok(encoded) => encoded,
        Err(e) => {
            return ApiError::Internal(format!("envelope serialization failed: {e}"))
                .into_response();
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(encoded))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn text_body(bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}
