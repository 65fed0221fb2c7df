//! Row level security policies for tenant-scoped tables.
//!
//! [`TenantTable`] is the single declaration of which tables are tenant
//! scoped. Each gets exactly one policy, `tenant_isolation`, that admits a
//! row only when its `tenant_id` equals the transaction's bound tenant. An
//! unset setting compares as NULL, so nothing is visible or writable without
//! a binding.
//!
//! The audit half of this module reads the live catalog and reports any
//! table that drifted from that shape.

use crate::binder::TENANT_SETTING;
use crate::error::DbError;
use crate::pool::DbPool;
use sqlx::{FromRow, PgConnection};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Name of the one policy every tenant-scoped table carries.
pub const POLICY_NAME: &str = "tenant_isolation";

/// Column holding the owning tenant.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Tables protected by the tenant isolation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantTable {
    Customers,
    Vehicles,
    Appointments,
    Invoices,
    ServiceItems,
    IdempotencyRecords,
}

impl TenantTable {
    pub const ALL: [TenantTable; 6] = [
        Self::Customers,
        Self::Vehicles,
        Self::Appointments,
        Self::Invoices,
        Self::ServiceItems,
        Self::IdempotencyRecords,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Vehicles => "vehicles",
            Self::Appointments => "appointments",
            Self::Invoices => "invoices",
            Self::ServiceItems => "service_items",
            Self::IdempotencyRecords => "idempotency_records",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Whether rows carry a `version` counter for optimistic concurrency.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        !matches!(self, Self::IdempotencyRecords)
    }
}

impl Display for TenantTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The isolation predicate shared by `USING` and `WITH CHECK`.
#[must_use]
pub fn isolation_predicate() -> String {
    format!("{TENANT_COLUMN} = NULLIF(current_setting('{TENANT_SETTING}', true), '')::uuid")
}

/// DDL that (re)creates the policy of `table`. Safe to run repeatedly.
#[must_use]
pub fn policy_statements(table: TenantTable) -> Vec<String> {
    let table = table.as_str();
    let predicate = isolation_predicate();
    vec![
        format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY"),
        format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY"),
        format!("DROP POLICY IF EXISTS {POLICY_NAME} ON {table}"),
        format!(
            "CREATE POLICY {POLICY_NAME} ON {table} FOR ALL \
             USING ({predicate}) WITH CHECK ({predicate})"
        ),
    ]
}

/// Install the isolation policy on every declared table.
///
/// Runs with the migrating (owner) role, inside the caller's transaction.
#[instrument(skip(conn))]
pub async fn install_policies(conn: &mut PgConnection) -> Result<(), DbError> {
    for table in TenantTable::ALL {
        for statement in policy_statements(table) {
            sqlx::query(&statement).execute(&mut *conn).await?;
        }
        tracing::debug!(table = table.as_str(), "Tenant policy installed");
    }
    tracing::info!(tables = TenantTable::ALL.len(), "Tenant policies installed");
    Ok(())
}

// ============================================================================
// Coverage audit
// ============================================================================

/// Catalog state of a table that has a `tenant_id` column.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TableState {
    pub table_name: String,
    pub rls_enabled: bool,
    pub rls_forced: bool,
    pub tenant_column_nullable: bool,
}

/// One row of `pg_policies`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PolicyRow {
    pub table_name: String,
    pub policy_name: String,
    pub command: String,
    pub using_expr: Option<String>,
    pub check_expr: Option<String>,
}

/// A deviation from the expected policy shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDrift {
    /// Declared tenant table does not exist or lacks `tenant_id`.
    MissingTable { table: String },
    /// Table has `tenant_id` but no policy.
    MissingPolicy { table: String },
    /// Table has more than one policy.
    DuplicatePolicies { table: String, count: usize },
    /// Policy expression does not compare `tenant_id` with the tenant setting.
    WrongColumn { table: String, expression: String },
    /// Policy has no `WITH CHECK` clause, so writes are not pinned to the
    /// bound tenant explicitly.
    MissingWithCheck { table: String },
    /// Policy does not apply to every command.
    PartialCommand { table: String, command: String },
    /// Row level security is not enabled.
    RlsDisabled { table: String },
    /// Row level security does not apply to the table owner.
    RlsNotForced { table: String },
    /// `tenant_id` accepts NULL.
    NullableTenantColumn { table: String },
}

impl Display for PolicyDrift {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTable { table } => write!(f, "{table}: declared tenant table not found"),
            Self::MissingPolicy { table } => write!(f, "{table}: no policy"),
            Self::DuplicatePolicies { table, count } => {
                write!(f, "{table}: {count} policies, expected exactly one")
            }
            Self::WrongColumn { table, expression } => {
                write!(f, "{table}: policy does not filter on {TENANT_COLUMN}: {expression}")
            }
            Self::MissingWithCheck { table } => write!(f, "{table}: policy has no WITH CHECK"),
            Self::PartialCommand { table, command } => {
                write!(f, "{table}: policy only covers {command}")
            }
            Self::RlsDisabled { table } => write!(f, "{table}: row level security disabled"),
            Self::RlsNotForced { table } => write!(f, "{table}: row level security not forced"),
            Self::NullableTenantColumn { table } => {
                write!(f, "{table}: {TENANT_COLUMN} is nullable")
            }
        }
    }
}

/// Compare catalog state against the expected shape.
#[must_use]
pub fn evaluate_coverage(tables: &[TableState], policies: &[PolicyRow]) -> Vec<PolicyDrift> {
    let mut drift = Vec::new();

    for declared in TenantTable::ALL {
        if !tables.iter().any(|t| t.table_name == declared.as_str()) {
            drift.push(PolicyDrift::MissingTable {
                table: declared.as_str().to_string(),
            });
        }
    }

    for state in tables {
        let table = state.table_name.clone();

        if !state.rls_enabled {
            drift.push(PolicyDrift::RlsDisabled { table: table.clone() });
        }
        if !state.rls_forced {
            drift.push(PolicyDrift::RlsNotForced { table: table.clone() });
        }
        if state.tenant_column_nullable {
            drift.push(PolicyDrift::NullableTenantColumn { table: table.clone() });
        }

        let own: Vec<&PolicyRow> = policies.iter().filter(|p| p.table_name == table).collect();
        match own.as_slice() {
            [] => drift.push(PolicyDrift::MissingPolicy { table }),
            [policy] => {
                if !policy.command.eq_ignore_ascii_case("ALL") {
                    drift.push(PolicyDrift::PartialCommand {
                        table: table.clone(),
                        command: policy.command.clone(),
                    });
                }
                for expr in [&policy.using_expr, &policy.check_expr].into_iter().flatten() {
                    if !filters_on_tenant(expr) {
                        drift.push(PolicyDrift::WrongColumn {
                            table: table.clone(),
                            expression: expr.clone(),
                        });
                    }
                }
                if policy.check_expr.is_none() {
                    drift.push(PolicyDrift::MissingWithCheck { table: table.clone() });
                }
                if policy.using_expr.is_none() {
                    drift.push(PolicyDrift::WrongColumn {
                        table,
                        expression: String::new(),
                    });
                }
            }
            many => drift.push(PolicyDrift::DuplicatePolicies {
                table,
                count: many.len(),
            }),
        }
    }

    drift
}

fn filters_on_tenant(expr: &str) -> bool {
    references_identifier(expr, TENANT_COLUMN) && expr.contains(TENANT_SETTING)
}

fn references_identifier(expr: &str, ident: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    expr.match_indices(ident).any(|(start, _)| {
        let before = expr[..start].chars().next_back();
        let after = expr[start + ident.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// Read the catalog and evaluate policy coverage for the current schema.
#[instrument(skip(pool))]
pub async fn audit_policies(pool: &DbPool) -> Result<Vec<PolicyDrift>, DbError> {
    let tables: Vec<TableState> = sqlx::query_as(
        r#"
        SELECT c.relname::text AS table_name,
               c.relrowsecurity AS rls_enabled,
               c.relforcerowsecurity AS rls_forced,
               NOT a.attnotnull AS tenant_column_nullable
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_attribute a
          ON a.attrelid = c.oid AND a.attname = $1 AND NOT a.attisdropped
        WHERE n.nspname = current_schema()
          AND c.relkind IN ('r', 'p')
        ORDER BY c.relname
        "#,
    )
    .bind(TENANT_COLUMN)
    .fetch_all(pool.inner())
    .await?;

    let policies: Vec<PolicyRow> = sqlx::query_as(
        r#"
        SELECT tablename::text AS table_name,
               policyname::text AS policy_name,
               cmd::text AS command,
               qual::text AS using_expr,
               with_check::text AS check_expr
        FROM pg_policies
        WHERE schemaname = current_schema()
        "#,
    )
    .fetch_all(pool.inner())
    .await?;

    Ok(evaluate_coverage(&tables, &policies))
}

/// Fail unless every tenant-scoped table is fully covered.
pub async fn verify_policy_coverage(pool: &DbPool) -> Result<(), DbError> {
    let drift = audit_policies(pool).await?;
    if drift.is_empty() {
        tracing::info!("Tenant policy coverage verified");
        Ok(())
    } else {
        Err(DbError::PolicyDrift(drift))
    }
}

/// Refuse to serve requests with a role that ignores row level security.
pub async fn ensure_rls_enforced_role(pool: &DbPool) -> Result<(), DbError> {
    let (role, is_superuser, bypasses_rls): (String, bool, bool) = sqlx::query_as(
        "SELECT rolname::text, rolsuper, rolbypassrls FROM pg_roles WHERE rolname = current_user",
    )
    .fetch_one(pool.inner())
    .await?;

    if is_superuser || bypasses_rls {
        return Err(DbError::UnsafeRole(format!(
            "role '{role}' bypasses row level security and must not serve requests"
        )));
    }
    Ok(())
}

/// Re-run the coverage audit every `interval`, logging drift as errors.
pub fn spawn_policy_auditor(pool: DbPool, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately and startup has just verified.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match audit_policies(&pool).await {
                Ok(drift) if drift.is_empty() => {
                    tracing::debug!("Tenant policy audit clean");
                }
                Ok(drift) => {
                    for finding in &drift {
                        tracing::error!(target: "security", finding = %finding, "Tenant policy drift");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Tenant policy audit failed");
                }
            }
        }
    })
}
