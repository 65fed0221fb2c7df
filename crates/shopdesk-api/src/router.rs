//! Layer assembly.
//!
//! Request flow, outermost first:
//!
//! 1. request id (generated or propagated, echoed on the response)
//! 2. trace span
//! 3. envelope normalizer
//! 4. body size limit and body read timeout
//! 5. tenant resolution (tenant-scoped routes only)
//! 6. rate guard (tenant-scoped routes only)
//! 7. handler, which binds the tenant through [`TenantTx`](crate::TenantTx)
//!    or, after reading its body, through [`TenantBinder`](crate::TenantBinder)
//!
//! Health probes sit outside the tenant layers.

use std::time::Duration;

use axum::{middleware, Router};
use shopdesk_db::DbPool;
use shopdesk_tenant::{TenantConfig, TenantLayer};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::RequestBodyTimeoutLayer,
    trace::TraceLayer,
};

use crate::envelope::envelope_middleware;
use crate::error::ApiError;
use crate::health::health_router;
use crate::rate_guard::{rate_guard_middleware, RateGuard};

/// Default request body limit (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default limit on the wait for each chunk of a request body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`build_router`].
#[derive(Debug, Clone)]
pub struct LayerSettings {
    pub tenant: TenantConfig,
    pub rate_guard: RateGuard,
    pub max_body_size: usize,
    pub body_timeout: Duration,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            tenant: TenantConfig::default(),
            rate_guard: RateGuard::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }
}

/// Put `routes` behind tenant resolution and the rate guard.
pub fn tenant_scoped<S>(routes: Router<S>, tenant: TenantConfig, guard: RateGuard) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    routes
        .layer(middleware::from_fn_with_state(guard, rate_guard_middleware))
        .layer(TenantLayer::with_config(tenant))
}

/// Layers shared by every route.
///
/// A body that stalls longer than `body_timeout` between chunks fails to
/// buffer and the request is refused with 400.
pub fn with_common_layers(app: Router, max_body_size: usize, body_timeout: Duration) -> Router {
    app.layer(RequestBodyTimeoutLayer::new(body_timeout))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(middleware::from_fn(envelope_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Complete service: health probes plus tenant-scoped `business` routes.
pub fn build_router(business: Router, pool: DbPool, settings: LayerSettings) -> Router {
    let scoped = tenant_scoped(business, settings.tenant, settings.rate_guard);

    let app = Router::new()
        .merge(health_router().with_state(pool))
        .merge(scoped)
        .fallback(|| async { ApiError::NotFound });

    with_common_layers(app, settings.max_body_size, settings.body_timeout)
}
