//! # shopdesk-db
//!
//! PostgreSQL access for the shopdesk admin backend, built so that a query
//! can only ever see the rows of the tenant bound to its transaction.
//!
//! - [`TenantTransaction`] binds the tenant transaction-locally before any
//!   query and unbinds before commit
//! - [`policy`] declares the row level security policy of every
//!   tenant-scoped table, installs it, and audits the live catalog for drift
//! - [`break_glass`] is the only RLS-bypassing path, audited per session
//! - [`models`] holds row types, version counters and idempotency records
//!
//! ```rust,ignore
//! use shopdesk_db::{models::Customer, DbPool, TenantTransaction};
//!
//! let pool = DbPool::connect(&database_url).await?;
//! let mut tx = TenantTransaction::begin(&pool, tenant_id).await?;
//! let customer = Customer::find_by_id(&mut tx, customer_id).await?;
//! tx.commit().await?;
//! ```

pub mod binder;
pub mod break_glass;
pub mod error;
pub mod migrations;
pub mod models;
pub mod policy;
pub mod pool;

pub use binder::{
    clear_tenant_context, get_current_tenant, set_tenant_context, TenantTransaction,
    TENANT_SETTING,
};
pub use break_glass::{BreakGlassGrant, BreakGlassPool, BreakGlassSession};
pub use error::DbError;
pub use migrations::run_migrations;
pub use policy::{
    audit_policies, ensure_rls_enforced_role, spawn_policy_auditor, verify_policy_coverage,
    PolicyDrift, TenantTable,
};
pub use pool::{DbPool, PoolConfig};
