//! Connection pool.
//!
//! Connections are shared by every tenant. The tenant setting is always
//! transaction-local, and a connection handed back to the pool has the
//! setting cleared once more before it can be reused.

use crate::binder::TENANT_SETTING;
use crate::error::DbError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Shared PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Connect with the default [`PoolConfig`].
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with(database_url, &PoolConfig::default()).await
    }

    /// Connect with explicit sizing.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the database is unreachable.
    pub async fn connect_with(database_url: &str, config: &PoolConfig) -> Result<Self, DbError> {
        let reset = format!("SELECT set_config('{TENANT_SETTING}', '', false)");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .after_release(move |conn, _meta| {
                let reset = reset.clone();
                Box::pin(async move {
                    // A connection that cannot be scrubbed is discarded.
                    match sqlx::query(&reset).execute(&mut *conn).await {
                        Ok(_) => Ok(true),
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping connection after failed tenant reset");
                            Ok(false)
                        }
                    }
                })
            })
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        tracing::info!(
            max_connections = config.max_connections,
            "Database pool connected"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying sqlx pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip `SELECT 1`. Touches no tenant tables.
    pub async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(DbError::from)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }
}
