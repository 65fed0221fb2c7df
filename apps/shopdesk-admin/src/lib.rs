//! Shopdesk admin API.
//!
//! Library half of the `shopdesk-admin` binary: configuration, state,
//! business routes and application assembly.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;

use axum::Router;
use shopdesk_api::{build_router, LayerSettings, RateGuard};
use shopdesk_db::DbPool;

use crate::config::{Config, ConfigError};
use crate::state::AppState;

/// Full application router for `config`.
pub fn app(config: &Config, state: AppState, rate_guard: RateGuard) -> Result<Router, ConfigError> {
    let settings = LayerSettings {
        tenant: config.tenant_config()?,
        rate_guard,
        max_body_size: config.max_body_size,
        body_timeout: config.request_body_timeout(),
    };
    let pool: DbPool = state.pool.clone();
    Ok(build_router(routes::business_router(state), pool, settings))
}
