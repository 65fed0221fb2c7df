//! Response envelope and pagination.
//!
//! Every JSON response leaves the service as
//! `{"data": .., "errors": .., "meta": {"request_id": .., "pagination": ..}}`.
//! Handlers may build an [`Envelope`] themselves; anything else is rewritten
//! by [`normalize`], which is idempotent: a body that is already enveloped
//! is returned as-is apart from a missing `meta.request_id`.

use crate::error::ErrorKind;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a client may request. Larger values are clamped.
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// Pagination
// ============================================================================

/// Normalized `page` / `page_size` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    /// 1-based page number.
    pub page: u32,
    /// Items per page, within `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageParams {
    /// Clamp numeric parameters into range. `None` selects the default.
    #[must_use]
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.map_or(1, |p| p.clamp(1, i64::from(u32::MAX)) as u32);
        let page_size = page_size.map_or(DEFAULT_PAGE_SIZE, |s| {
            s.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32
        });
        Self { page, page_size }
    }

    /// Build from raw query-string values.
    ///
    /// Unparsable values fall back to the default; out-of-range values are
    /// clamped. Nothing here is ever rejected.
    #[must_use]
    pub fn from_raw(page: Option<&str>, page_size: Option<&str>) -> Self {
        Self::new(page.and_then(parse_lenient), page_size.and_then(parse_lenient))
    }

    /// Rows to skip for SQL `OFFSET`.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }

    /// Rows to fetch for SQL `LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    /// Pagination metadata for a collection of `total` items.
    #[must_use]
    pub fn pagination(&self, total: u64) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
            total,
            total_pages: total.div_ceil(u64::from(self.page_size)),
        }
    }

    /// Cut the requested page out of an in-memory list.
    #[must_use]
    pub fn slice(&self, items: Vec<Value>) -> (Vec<Value>, Pagination) {
        let pagination = self.pagination(items.len() as u64);
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let page = items
            .into_iter()
            .skip(start)
            .take(self.page_size as usize)
            .collect();
        (page, pagination)
    }
}

fn parse_lenient(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(n) => Some(n),
        // All digits but too large for i64: clamp rather than ignore.
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => Some(i64::MAX),
        Err(_) => None,
    }
}

/// `meta.pagination` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

// ============================================================================
// Envelope
// ============================================================================

/// `errors` block of the envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Error body with the kind's code and an explicit message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code().to_string(),
            message: message.into(),
            details: None,
        }
    }

    /// Error body with the kind's code and default message.
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// Attach structured details (e.g. the current version on conflict).
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".into(), Value::String(self.code.clone()));
        map.insert("message".into(), Value::String(self.message.clone()));
        if let Some(details) = &self.details {
            map.insert("details".into(), details.clone());
        }
        Value::Object(map)
    }
}

/// `meta` block of the envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Meta {
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Uniform response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T = Value> {
    pub data: Option<T>,
    pub errors: Option<ErrorBody>,
    pub meta: Meta,
}

impl<T> Envelope<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            errors: None,
            meta: Meta::default(),
        }
    }

    /// A page already cut by the caller (typically with SQL `LIMIT/OFFSET`).
    pub fn paginated(data: T, params: &PageParams, total: u64) -> Self {
        Self {
            data: Some(data),
            errors: None,
            meta: Meta {
                request_id: None,
                pagination: Some(params.pagination(total)),
            },
        }
    }

    /// Error response.
    pub fn failure(error: ErrorBody) -> Self {
        Self {
            data: None,
            errors: Some(error),
            meta: Meta::default(),
        }
    }

    /// Set `meta.request_id`.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.meta.request_id = request_id.map(str::to_string);
        self
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Whether `body` already has exactly the envelope shape.
#[must_use]
pub fn is_enveloped(body: &Value) -> bool {
    let Some(map) = body.as_object() else {
        return false;
    };
    map.len() == 3
        && map.contains_key("data")
        && map.get("errors").is_some_and(|e| e.is_null() || e.is_object())
        && map.get("meta").is_some_and(Value::is_object)
}

/// Wrap a response body in the envelope.
///
/// * Already-enveloped bodies pass through; only a missing
///   `meta.request_id` is filled in.
/// * Statuses `>= 400` become an `errors` block. Bodies of the form
///   `{"code", "message"}` or `{"error", "message"}` keep their code.
/// * Top-level arrays, and objects holding exactly one array-valued key,
///   are paginated with `params`.
/// * Anything else becomes `data` verbatim.
#[must_use]
pub fn normalize(status: u16, body: Value, params: &PageParams, request_id: Option<&str>) -> Value {
    if is_enveloped(&body) {
        return fill_request_id(body, request_id);
    }

    let (data, errors, pagination) = if status >= 400 {
        (Value::Null, error_from_body(status, body).to_value(), None)
    } else {
        match body {
            Value::Array(items) => {
                let (page, pagination) = params.slice(items);
                (Value::Array(page), Value::Null, Some(pagination))
            }
            Value::Object(map) if is_named_list(&map) => {
                let mut map = map;
                let (key, items) = map
                    .iter_mut()
                    .next()
                    .map(|(k, v)| (k.clone(), v.take()))
                    .unwrap_or_default();
                let items = match items {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                let (page, pagination) = params.slice(items);
                map.insert(key, Value::Array(page));
                (Value::Object(map), Value::Null, Some(pagination))
            }
            other => (other, Value::Null, None),
        }
    };

    let mut meta = Map::new();
    meta.insert("request_id".into(), request_id.map_or(Value::Null, |id| json!(id)));
    if let Some(p) = pagination {
        meta.insert("pagination".into(), json!(p));
    }

    json!({
        "data": data,
        "errors": errors,
        "meta": Value::Object(meta),
    })
}

fn is_named_list(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.values().all(Value::is_array)
}

fn fill_request_id(mut body: Value, request_id: Option<&str>) -> Value {
    if let (Some(id), Some(meta)) = (request_id, body.get_mut("meta").and_then(Value::as_object_mut)) {
        let missing = meta.get("request_id").map_or(true, Value::is_null);
        if missing {
            meta.insert("request_id".into(), Value::String(id.to_string()));
        }
    }
    body
}

fn error_from_body(status: u16, body: Value) -> ErrorBody {
    let fallback_code = ErrorKind::code_for_status(status);
    match body {
        Value::Object(map) => {
            let code = map
                .get("code")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .unwrap_or(fallback_code);
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(code);
            ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                details: map.get("details").cloned(),
            }
        }
        Value::String(message) if !message.is_empty() => ErrorBody {
            code: fallback_code.to_string(),
            message,
            details: None,
        },
        _ => ErrorBody {
            code: fallback_code.to_string(),
            message: fallback_code.to_string(),
            details: None,
        },
    }
}
