//! # shopdesk-api
//!
//! HTTP plumbing shared by shopdesk services.
//!
//! - [`TenantTx`]: extractor that begins a transaction bound to the tenant
//!   of the request; handlers cannot query before binding
//! - [`TenantBinder`]: the same binding, deferred until a write handler has
//!   read its body
//! - [`ConcurrencyArbiter`] / [`IfMatchHeader`]: `ETag` / `If-Match`
//!   optimistic concurrency
//! - [`IdempotencyCache`] / [`IdempotentRequest`]: `Idempotency-Key` replay
//! - [`RateGuard`]: per-tenant fixed-window admission
//! - [`envelope_middleware`]: `{data, errors, meta}` on every JSON response
//! - [`build_router`]: all of the above in the required order

pub mod binding;
pub mod concurrency;
pub mod envelope;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod rate_guard;
pub mod router;

pub use binding::{TenantBinder, TenantTx};
pub use concurrency::{etag_header, ConcurrencyArbiter, IfMatchHeader, Tagged, VersionGuard};
pub use envelope::{envelope_middleware, normalize_response, page_params, REQUEST_ID_HEADER};
pub use error::{ApiError, ApiResult};
pub use health::health_router;
pub use idempotency::{
    finish, finish_tagged, request_hash, Admission, IdempotencyCache, IdempotencyClaim, IdempotencyKey,
    IdempotentRequest, IDEMPOTENCY_KEY_HEADER, IDEMPOTENCY_STATUS_HEADER,
};
pub use rate_guard::{
    rate_guard_middleware, spawn_rate_guard_cleanup, RateDecision, RateGuard, RateGuardConfig,
    RateQuota,
};
pub use router::{build_router, tenant_scoped, with_common_layers, LayerSettings};
