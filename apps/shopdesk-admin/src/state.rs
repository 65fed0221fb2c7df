//! Application state shared across request handlers.

use axum::extract::FromRef;
use shopdesk_api::IdempotencyCache;
use shopdesk_db::DbPool;

/// Cloned per request; the pool is reference counted internally.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub idempotency: IdempotencyCache,
}

impl AppState {
    pub fn new(pool: DbPool, idempotency: IdempotencyCache) -> Self {
        Self { pool, idempotency }
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for IdempotencyCache {
    fn from_ref(state: &AppState) -> Self {
        state.idempotency
    }
}
