//! Session-scoped tenant binding.
//!
//! The tenant of a request is written to the PostgreSQL setting
//! `app.current_tenant` with `set_config(.., is_local => true)`, so it lives
//! exactly as long as the surrounding transaction. Row level security
//! policies compare each row's `tenant_id` against that setting.
//!
//! [`TenantTransaction`] is the only way request code obtains a connection:
//! it binds before handing the connection out and unbinds before commit.
//! Dropping it without committing rolls back.

use crate::error::DbError;
use crate::pool::DbPool;
use shopdesk_core::TenantId;
use sqlx::{PgConnection, Postgres, Transaction};
use std::ops::{Deref, DerefMut};
use tracing::instrument;

/// Name of the transaction-local setting holding the bound tenant.
pub const TENANT_SETTING: &str = "app.current_tenant";

/// Bind `tenant_id` to the current transaction.
///
/// Must be called inside a transaction: outside one the setting would be
/// discarded at the end of the statement.
pub async fn set_tenant_context(conn: &mut PgConnection, tenant_id: TenantId) -> Result<(), DbError> {
    let expected = tenant_id.to_string();
    let applied: String = sqlx::query_scalar("SELECT set_config($1, $2, true)")
        .bind(TENANT_SETTING)
        .bind(&expected)
        .fetch_one(conn)
        .await
        .map_err(|e| DbError::TenantBindingFailed(e.to_string()))?;

    if applied != expected {
        return Err(DbError::TenantBindingFailed(format!(
            "setting reads back '{applied}'"
        )));
    }
    Ok(())
}

/// Clear the tenant of the current transaction.
pub async fn clear_tenant_context(conn: &mut PgConnection) -> Result<(), DbError> {
    sqlx::query("SELECT set_config($1, '', true)")
        .bind(TENANT_SETTING)
        .execute(conn)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}

/// Tenant currently bound to the connection, if any.
pub async fn get_current_tenant(conn: &mut PgConnection) -> Result<Option<TenantId>, DbError> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT NULLIF(current_setting($1, true), '')")
            .bind(TENANT_SETTING)
            .fetch_one(conn)
            .await?;

    value
        .map(|v| {
            v.parse::<TenantId>()
                .map_err(|e| DbError::ValidationFailed(e.to_string()))
        })
        .transpose()
}

/// A transaction with the tenant bound.
///
/// ```rust,ignore
/// let mut tx = TenantTransaction::begin(&pool, tenant_id).await?;
/// let customer = Customer::find_by_id(&mut tx, id).await?;
/// tx.commit().await?;
/// ```
pub struct TenantTransaction {
    tx: Transaction<'static, Postgres>,
    tenant_id: TenantId,
}

impl std::fmt::Debug for TenantTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantTransaction")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl TenantTransaction {
    /// Begin a transaction and bind `tenant_id` to it.
    ///
    /// # Errors
    ///
    /// `DbError::TenantBindingFailed` if no connection can be acquired or the
    /// setting does not read back; the transaction is rolled back and no
    /// query of the caller runs.
    #[instrument(skip(pool), fields(tenant_id = %tenant_id))]
    pub async fn begin(pool: &DbPool, tenant_id: TenantId) -> Result<Self, DbError> {
        let mut tx = pool
            .inner()
            .begin()
            .await
            .map_err(|e| DbError::TenantBindingFailed(e.to_string()))?;

        set_tenant_context(&mut tx, tenant_id).await?;

        Ok(Self { tx, tenant_id })
    }

    /// Tenant bound to this transaction.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Connection to run queries on.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Unbind the tenant and commit.
    pub async fn commit(mut self) -> Result<(), DbError> {
        clear_tenant_context(&mut self.tx).await?;
        self.tx.commit().await.map_err(DbError::from)
    }

    /// Roll back explicitly.
    pub async fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback().await.map_err(DbError::from)
    }
}

impl Deref for TenantTransaction {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for TenantTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_name_is_namespaced() {
        // Custom settings must contain a dot to be accepted by PostgreSQL.
        assert!(TENANT_SETTING.contains('.'));
    }
}
