//! shopdesk Core Library
//!
//! Shared types used by every layer of the shopdesk admin backend.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (TenantId, CustomerId, AppointmentId, InvoiceId)
//! - [`traits`] - Tenant-scoped entity trait (TenantScoped)
//! - [`error`] - Stable error taxonomy shared by every crate (ErrorKind)
//! - [`envelope`] - Response envelope, pagination and the body normalizer
//! - [`version`] - Version tokens and `If-Match` parsing
//!
//! # Example
//!
//! ```
//! use shopdesk_core::{ErrorKind, PageParams, TenantId, VersionToken};
//!
//! let tenant_id = TenantId::new();
//! let token = VersionToken::from_version(3);
//! assert_eq!(token.etag(), "\"v3\"");
//!
//! let params = PageParams::from_raw(Some("2"), Some("10000"));
//! assert_eq!(params.page_size, 100);
//!
//! assert_eq!(ErrorKind::Conflict.code(), "conflict");
//! # let _ = tenant_id;
//! ```

pub mod envelope;
pub mod error;
pub mod ids;
pub mod traits;
pub mod version;

pub use envelope::{
    is_enveloped, normalize, Envelope, ErrorBody, Meta, PageParams, Pagination,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use error::{ErrorKind, TenantMismatch};
pub use ids::{AppointmentId, CustomerId, InvoiceId, ParseIdError, TenantId};
pub use traits::TenantScoped;
pub use version::{EntityTag, IfMatch, IfMatchError, VersionToken};
