//! Database migration management.

use crate::error::DbError;
use crate::policy::{install_policies, verify_policy_coverage};
use crate::pool::DbPool;

/// Run pending migrations, then (re)install the tenant policies and verify
/// that every tenant-scoped table is covered.
///
/// Must run as the table owner, not as the request-handling role.
///
/// ```rust,ignore
/// use shopdesk_db::{run_migrations, DbPool};
///
/// let pool = DbPool::connect("postgres://shopdesk_owner@localhost/shopdesk").await?;
/// run_migrations(&pool).await?;
/// ```
///
/// # Errors
///
/// `DbError::MigrationFailed` if a migration fails, `DbError::PolicyDrift`
/// if coverage is incomplete afterwards.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool.inner())
        .await
        .map_err(DbError::MigrationFailed)?;

    let mut tx = pool.inner().begin().await?;
    install_policies(&mut tx).await?;
    tx.commit().await?;

    verify_policy_coverage(pool).await?;

    tracing::info!("Migrations completed successfully");
    Ok(())
}
