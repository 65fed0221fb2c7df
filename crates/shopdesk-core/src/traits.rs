//! Tenant-scoped entity trait.
//!
//! Every row type read from a tenant-scoped table implements [`TenantScoped`].
//! Repositories call [`TenantScoped::ensure_tenant`] on each row they load, so
//! a row belonging to another tenant is refused even if the storage policy
//! were ever misconfigured.

use crate::error::TenantMismatch;
use crate::ids::TenantId;

/// Trait for entities that belong to exactly one tenant.
///
/// ```
/// use shopdesk_core::{TenantId, TenantScoped};
///
/// struct Vehicle {
///     tenant_id: TenantId,
/// }
///
/// impl TenantScoped for Vehicle {
///     fn tenant_id(&self) -> TenantId {
///         self.tenant_id
///     }
/// }
///
/// let tenant = TenantId::new();
/// let vehicle = Vehicle { tenant_id: tenant };
/// assert!(vehicle.ensure_tenant(tenant).is_ok());
/// assert!(vehicle.ensure_tenant(TenantId::new()).is_err());
/// ```
pub trait TenantScoped {
    /// Returns the tenant that owns this entity.
    fn tenant_id(&self) -> TenantId;

    /// Fails when the entity is owned by a tenant other than `expected`.
    fn ensure_tenant(&self, expected: TenantId) -> Result<(), TenantMismatch> {
        let actual = self.tenant_id();
        if actual == expected {
            Ok(())
        } else {
            Err(TenantMismatch { expected, actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        tenant: TenantId,
    }

    impl TenantScoped for Row {
        fn tenant_id(&self) -> TenantId {
            self.tenant
        }
    }

    #[test]
    fn test_same_tenant_passes() {
        let tenant = TenantId::new();
        assert!(Row { tenant }.ensure_tenant(tenant).is_ok());
    }

    #[test]
    fn test_other_tenant_is_refused() {
        let owner = TenantId::new();
        let bound = TenantId::new();
        let err = Row { tenant: owner }.ensure_tenant(bound).unwrap_err();
        assert_eq!(err.expected, bound);
        assert_eq!(err.actual, owner);
    }

    #[test]
    fn test_trait_is_object_safe() {
        let tenant = TenantId::new();
        let row: Box<dyn TenantScoped> = Box::new(Row { tenant });
        assert_eq!(row.tenant_id(), tenant);
    }
}
