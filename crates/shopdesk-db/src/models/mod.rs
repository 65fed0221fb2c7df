//! Tenant-scoped row types and their queries.
//!
//! Every query here runs on a [`TenantTransaction`](crate::TenantTransaction),
//! and every loaded row is checked against the bound tenant.

pub mod appointment;
pub mod customer;
pub mod idempotency_record;
pub mod invoice;
pub mod versioned;

pub use appointment::{Appointment, AppointmentPatch, AppointmentStatus, CreateAppointment};
pub use customer::{CreateCustomer, Customer};
pub use idempotency_record::{
    spawn_idempotency_sweeper, sweep_expired, ClaimOutcome, IdempotencyRecord, IdempotencyScope,
    ReplayDecision, StoredResponse, IDEMPOTENCY_TTL_HOURS,
};
pub use invoice::{CreateInvoice, Invoice};
pub use versioned::{bump_version, current_version, lock_version, Versioned};
