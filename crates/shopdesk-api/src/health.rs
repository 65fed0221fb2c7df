//! Liveness and readiness probes.
//!
//! Neither route requires a tenant, and neither touches a tenant table.

use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use shopdesk_db::DbPool;

use crate::error::ApiError;

/// `GET /health/live` and `GET /health/ready`.
pub fn health_router<S>() -> Router<S>
where
    DbPool: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health/live", get(live_handler))
        .route("/health/ready", get(ready_handler))
}

/// The process is up. Never touches the database.
pub async fn live_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// The database answers `SELECT 1`.
pub async fn ready_handler(State(pool): State<DbPool>) -> Result<Json<Value>, ApiError> {
    pool.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        ApiError::StorageUnavailable(e)
    })?;
    Ok(Json(json!({ "status": "ready" })))
}
