//! Row version counters for optimistic concurrency.
//!
//! Versioned tables carry `version BIGINT NOT NULL DEFAULT 1`. Every write
//! sets `version = version + 1` in the same statement, guarded by
//! `WHERE version = $expected`.

use crate::binder::TenantTransaction;
use crate::error::DbError;
use crate::policy::TenantTable;
use shopdesk_core::VersionToken;
use uuid::Uuid;

/// Entities that expose a version counter.
pub trait Versioned {
    fn version(&self) -> i64;

    /// Opaque token clients see in `ETag`.
    fn version_token(&self) -> VersionToken {
        VersionToken::from_version(self.version())
    }
}

fn versioned_table(table: TenantTable) -> Result<&'static str, DbError> {
    if table.is_versioned() {
        Ok(table.as_str())
    } else {
        Err(DbError::ValidationFailed(format!("{table} has no version column")))
    }
}

/// Lock the row and return its version. `None` if the row is not visible
/// to the bound tenant.
pub async fn lock_version(
    tx: &mut TenantTransaction,
    table: TenantTable,
    id: Uuid,
) -> Result<Option<i64>, DbError> {
    let sql = format!("SELECT version FROM {} WHERE id = $1 FOR UPDATE", versioned_table(table)?);
    let version = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await?;
    Ok(version)
}

/// Current version without locking.
pub async fn current_version(
    tx: &mut TenantTransaction,
    table: TenantTable,
    id: Uuid,
) -> Result<Option<i64>, DbError> {
    let sql = format!("SELECT version FROM {} WHERE id = $1", versioned_table(table)?);
    let version = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(tx.conn())
        .await?;
    Ok(version)
}

/// Advance the version of a row from `expected` to `expected + 1`.
///
/// # Errors
///
/// `DbError::VersionConflict` if the row moved on, `DbError::NotFound` if it
/// is not visible.
pub async fn bump_version(
    tx: &mut TenantTransaction,
    table: TenantTable,
    id: Uuid,
    expected: i64,
) -> Result<i64, DbError> {
    let sql = format!(
        "UPDATE {} SET version = version + 1, updated_at = NOW() \
         WHERE id = $1 AND version = $2 RETURNING version",
        versioned_table(table)?
    );
    let bumped: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .bind(expected)
        .fetch_optional(tx.conn())
        .await?;

    match bumped {
        Some(version) => Ok(version),
        None => Err(stale_write(tx, table, id).await),
    }
}

/// Explain why a guarded write matched no row.
pub(crate) async fn stale_write(tx: &mut TenantTransaction, table: TenantTable, id: Uuid) -> DbError {
    match current_version(tx, table, id).await {
        Ok(Some(current)) => DbError::VersionConflict { current },
        Ok(None) => DbError::NotFound(format!("{table} {id}")),
        Err(e) => e,
    }
}
