//! # shopdesk-tenant
//!
//! Tower/Axum middleware that resolves the tenant of every inbound request.
//!
//! ## Features
//!
//! - **Fixed precedence**: verified token claim, then `X-Tenant-Id` header,
//!   then subdomain, configurable per deployment
//! - **Fail closed**: malformed, nil or contradictory signals are rejected
//!   with `400 invalid_tenant_context`, never replaced by a default tenant
//! - **Claim verification**: HS256 or RS256 bearer tokens via `jsonwebtoken`
//! - **Composability**: standard Tower `Layer`/`Service`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use axum::{routing::get, Extension, Router};
//! use shopdesk_tenant::{TenantContext, TenantLayer};
//!
//! async fn list_customers(Extension(ctx): Extension<TenantContext>) -> String {
//!     format!("Customers for tenant: {}", ctx.tenant_id())
//! }
//!
//! let app = Router::new()
//!     .route("/customers", get(list_customers))
//!     .layer(TenantLayer::new());
//! ```
//!
//! The resolved tenant is bound to the database transaction by
//! `shopdesk-db`; this crate never touches storage.

mod claim;
mod config;
mod error;
mod extract;
mod layer;
mod service;

pub use claim::{ClaimError, ClaimVerifier};
pub use config::{TenantConfig, TenantConfigBuilder, DEFAULT_CLAIM_NAME, DEFAULT_HEADER_NAME};
pub use error::TenantError;
pub use extract::{
    parse_tenant_id, resolve_tenant, TenantContext, TenantSignalSource, VerifiedTenantClaim,
};
pub use layer::TenantLayer;
pub use service::{TenantService, TenantServiceFuture};

pub use shopdesk_core::TenantId;
