//! Tenant-bound transaction extractors.
//!
//! A handler that takes [`TenantTx`] cannot run a query before the tenant of
//! the request is bound: the extractor begins the transaction and binds the
//! tenant resolved by the tenant layer, or rejects the request.
//!
//! [`TenantTx`] checks out a pooled connection while the request parts are
//! extracted, before any body extractor runs. Handlers that read a body take
//! [`TenantBinder`] instead and call [`TenantBinder::begin`] once the body is
//! in memory, so a slow upload never holds a connection.

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use shopdesk_core::TenantId;
use shopdesk_db::{DbPool, TenantTransaction};
use shopdesk_tenant::TenantError;
use std::ops::{Deref, DerefMut};

use crate::error::ApiError;

/// A [`TenantTransaction`] bound to the tenant of the current request.
///
/// Dropping it without [`commit`](TenantTransaction::commit) rolls back.
#[derive(Debug)]
pub struct TenantTx(pub TenantTransaction);

impl TenantTx {
    pub fn into_inner(self) -> TenantTransaction {
        self.0
    }

    pub async fn commit(self) -> Result<(), ApiError> {
        self.0.commit().await.map_err(ApiError::from)
    }
}

impl Deref for TenantTx {
    type Target = TenantTransaction;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for TenantTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantTx
where
    DbPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        TenantBinder::from_request_parts(parts, state)
            .await?
            .begin()
            .await
    }
}

/// The resolved tenant and the pool, with no connection checked out yet.
///
/// Extraction only checks that the tenant layer ran.
#[derive(Debug, Clone)]
pub struct TenantBinder {
    pool: DbPool,
    tenant_id: TenantId,
}

impl TenantBinder {
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Begin the transaction and bind the tenant.
    pub async fn begin(&self) -> Result<TenantTx, ApiError> {
        let tx = TenantTransaction::begin(&self.pool, self.tenant_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "security",
                    tenant_id = %self.tenant_id,
                    error = %e,
                    "Tenant binding failed, request refused"
                );
                ApiError::from(e)
            })?;

        Ok(TenantTx(tx))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantBinder
where
    DbPool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .extensions
            .get::<TenantId>()
            .copied()
            .ok_or(ApiError::Tenant(TenantError::Missing))?;

        Ok(Self {
            pool: DbPool::from_ref(state),
            tenant_id,
        })
    }
}
