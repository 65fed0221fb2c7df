//! Break-glass access.
//!
//! Administrative recovery sometimes has to read or repair rows across
//! tenants. That path uses a separate pool connected as a role with
//! `BYPASSRLS`, is never reachable from request handling, and leaves an
//! audit row plus a `security` log event for every session.

use crate::error::DbError;
use crate::pool::DbPool;
use sqlx::{PgConnection, Postgres, Transaction};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// Who is using break-glass access and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakGlassGrant {
    operator: String,
    reason: String,
}

impl BreakGlassGrant {
    /// Both operator and reason are mandatory.
    pub fn new(operator: impl Into<String>, reason: impl Into<String>) -> Result<Self, DbError> {
        let operator = operator.into().trim().to_string();
        let reason = reason.into().trim().to_string();
        if operator.is_empty() {
            return Err(DbError::BreakGlassDenied("operator is required".into()));
        }
        if reason.is_empty() {
            return Err(DbError::BreakGlassDenied("reason is required".into()));
        }
        Ok(Self { operator, reason })
    }

    #[must_use]
    pub fn operator(&self) -> &str {
        &self.operator
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Pool for privileged sessions.
#[derive(Debug, Clone)]
pub struct BreakGlassPool {
    pool: DbPool,
}

impl BreakGlassPool {
    /// Connect and check that the role really bypasses row level security.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let pool = DbPool::connect(database_url).await?;

        let (role, bypasses): (String, bool) = sqlx::query_as(
            "SELECT rolname::text, rolsuper OR rolbypassrls FROM pg_roles WHERE rolname = current_user",
        )
        .fetch_one(pool.inner())
        .await?;

        if !bypasses {
            return Err(DbError::BreakGlassDenied(format!(
                "role '{role}' does not bypass row level security"
            )));
        }
        Ok(Self { pool })
    }

    /// Open an audited privileged transaction.
    ///
    /// The audit row is committed before the session starts, so it survives
    /// even if the session itself rolls back.
    pub async fn begin(&self, grant: BreakGlassGrant) -> Result<BreakGlassSession, DbError> {
        let audit_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO break_glass_audit (operator, reason)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(grant.operator())
        .bind(grant.reason())
        .fetch_one(self.pool.inner())
        .await?;

        tracing::warn!(
            target: "security",
            audit_id = %audit_id,
            operator = grant.operator(),
            reason = grant.reason(),
            "Break-glass session opened"
        );

        let tx = self.pool.inner().begin().await?;
        Ok(BreakGlassSession {
            tx,
            audit: AuditGuard {
                audit_id,
                pool: self.pool.clone(),
                open: true,
            },
        })
    }
}

/// A privileged transaction. Row level security does not apply.
///
/// Dropping the session without [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls back and closes the audit record as
/// `abandoned`.
pub struct BreakGlassSession {
    tx: Transaction<'static, Postgres>,
    audit: AuditGuard,
}

impl BreakGlassSession {
    #[must_use]
    pub fn audit_id(&self) -> Uuid {
        self.audit.audit_id
    }

    /// Commit and close the audit record.
    pub async fn commit(self) -> Result<(), DbError> {
        let Self { tx, mut audit } = self;
        tx.commit().await?;
        audit.close("committed").await
    }

    /// Roll back and close the audit record.
    pub async fn rollback(self) -> Result<(), DbError> {
        let Self { tx, mut audit } = self;
        tx.rollback().await?;
        audit.close("rolled_back").await
    }
}

impl Deref for BreakGlassSession {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for BreakGlassSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}

/// Open audit record of a session.
struct AuditGuard {
    audit_id: Uuid,
    pool: DbPool,
    open: bool,
}

impl AuditGuard {
    async fn close(&mut self, outcome: &'static str) -> Result<(), DbError> {
        self.open = false;
        close_audit(&self.pool, self.audit_id, outcome).await
    }
}

impl Drop for AuditGuard {
    fn drop(&mut self) {
        if !self.open {
            return;
        }

        let audit_id = self.audit_id;
        tracing::warn!(
            target: "security",
            audit_id = %audit_id,
            "Break-glass session dropped without commit or rollback"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                target: "security",
                audit_id = %audit_id,
                "No runtime left to close the abandoned break-glass audit record"
            );
            return;
        };

        let pool = self.pool.clone();
        handle.spawn(async move {
            if let Err(e) = close_audit(&pool, audit_id, "abandoned").await {
                tracing::error!(
                    target: "security",
                    audit_id = %audit_id,
                    error = %e,
                    "Failed to close abandoned break-glass audit record"
                );
            }
        });
    }
}

async fn close_audit(pool: &DbPool, audit_id: Uuid, outcome: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE break_glass_audit SET ended_at = NOW(), outcome = $2 WHERE id = $1")
        .bind(audit_id)
        .bind(outcome)
        .execute(pool.inner())
        .await?;

    tracing::warn!(target: "security", audit_id = %audit_id, outcome, "Break-glass session closed");
    Ok(())
}
