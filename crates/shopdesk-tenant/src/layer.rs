//! Tower Layer for tenant resolution.

use crate::config::TenantConfig;
use crate::service::TenantService;
use std::sync::Arc;
use tower_layer::Layer;

/// Tower Layer that resolves the tenant of every request.
///
/// ```rust,ignore
/// use shopdesk_tenant::{TenantConfig, TenantLayer};
/// use axum::{routing::get, Router};
///
/// let app = Router::new()
///     .route("/appointments/:id", get(get_appointment))
///     .layer(TenantLayer::with_config(
///         TenantConfig::builder().base_domain("shops.example.com").build(),
///     ));
/// ```
#[derive(Debug, Clone)]
pub struct TenantLayer {
    config: Arc<TenantConfig>,
}

impl TenantLayer {
    /// Create a layer with the default configuration
    /// (`X-Tenant-Id` header, `tid` claim, tenant required).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TenantConfig::default())
    }

    #[must_use]
    pub fn with_config(config: TenantConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TenantConfig {
        &self.config
    }
}

impl Default for TenantLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for TenantLayer {
    type Service = TenantService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantService::new(inner, Arc::clone(&self.config))
    }
}
