//! Error types for the shopdesk-db crate.

use crate::policy::PolicyDrift;
use shopdesk_core::{ErrorKind, TenantMismatch};
use thiserror::Error;

/// SQLSTATE raised when a row violates a row level security policy.
const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// Database operation errors.
///
/// ```rust
/// use shopdesk_db::DbError;
/// use shopdesk_core::ErrorKind;
///
/// let err = DbError::VersionConflict { current: 4 };
/// assert_eq!(err.kind(), ErrorKind::Conflict);
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A tenant-scoped operation was attempted without a tenant.
    #[error("Tenant context required but not set")]
    TenantContextMissing,

    /// The tenant could not be bound to the transaction.
    #[error("Tenant binding failed: {0}")]
    TenantBindingFailed(String),

    /// The row level security policy refused the row.
    #[error("Row refused by tenant policy: {0}")]
    PolicyDenied(String),

    /// Policy coverage audit found problems.
    #[error("Tenant policy drift detected: {}", format_drift(.0))]
    PolicyDrift(Vec<PolicyDrift>),

    /// The request-handling role would bypass row level security.
    #[error("Unsafe database role: {0}")]
    UnsafeRole(String),

    /// Row version changed since the caller last read it.
    #[error("Version conflict: current version is {current}")]
    VersionConflict { current: i64 },

    /// Break-glass access was refused.
    #[error("Break-glass access denied: {0}")]
    BreakGlassDenied(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation failed.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

fn format_drift(findings: &[PolicyDrift]) -> String {
    findings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DbError {
    /// Client-facing classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::ConnectionFailed(_) | DbError::TenantBindingFailed(_) => {
                ErrorKind::StorageUnavailable
            }
            DbError::TenantContextMissing => ErrorKind::InvalidTenantContext,
            DbError::PolicyDenied(_) => ErrorKind::PolicyDenied,
            DbError::VersionConflict { .. } => ErrorKind::Conflict,
            DbError::NotFound(_) => ErrorKind::NotFound,
            DbError::ValidationFailed(_) => ErrorKind::Validation,
            DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::PolicyDrift(_)
            | DbError::UnsafeRole(_)
            | DbError::BreakGlassDenied(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    #[must_use]
    pub fn is_policy_denied(&self) -> bool {
        matches!(self, DbError::PolicyDenied(_))
    }

    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, DbError::VersionConflict { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => DbError::ConnectionFailed(err),
            sqlx::Error::Database(db)
                if db.code().as_deref() == Some(SQLSTATE_INSUFFICIENT_PRIVILEGE) =>
            {
                DbError::PolicyDenied(db.message().to_string())
            }
            // Composite (tenant_id, id) keys make a row of another tenant
            // look exactly like a missing one.
            sqlx::Error::Database(db)
                if db.code().as_deref() == Some(SQLSTATE_FOREIGN_KEY_VIOLATION) =>
            {
                DbError::ValidationFailed(format!(
                    "referenced row does not exist ({})",
                    db.constraint().unwrap_or("foreign key")
                ))
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some(SQLSTATE_UNIQUE_VIOLATION) => {
                DbError::ValidationFailed(format!(
                    "duplicate value ({})",
                    db.constraint().unwrap_or("unique constraint")
                ))
            }
            sqlx::Error::RowNotFound => DbError::NotFound("row".to_string()),
            _ => DbError::QueryFailed(err),
        }
    }
}

impl From<TenantMismatch> for DbError {
    fn from(err: TenantMismatch) -> Self {
        tracing::error!(
            target: "security",
            expected = %err.expected,
            actual = %err.actual,
            "Row of another tenant reached the repository layer"
        );
        DbError::PolicyDenied(err.to_string())
    }
}
