//! Configuration for the tenant resolver.

use crate::claim::ClaimVerifier;
use crate::extract::TenantSignalSource;

/// Default header carrying an explicit tenant id.
pub const DEFAULT_HEADER_NAME: &str = "X-Tenant-Id";

/// Default JWT claim carrying the tenant id.
pub const DEFAULT_CLAIM_NAME: &str = "tid";

/// Tenant resolver configuration.
///
/// ```rust
/// use shopdesk_tenant::{TenantConfig, TenantSignalSource};
///
/// let config = TenantConfig::builder()
///     .header_name("X-Shop-Id")
///     .base_domain("shops.example.com")
///     .require_tenant(true)
///     .build();
///
/// assert_eq!(config.header_name, "X-Shop-Id");
/// assert_eq!(
///     config.precedence,
///     vec![TenantSignalSource::Claim, TenantSignalSource::Header, TenantSignalSource::Subdomain]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TenantConfig {
    /// Header carrying an explicit tenant id.
    pub header_name: String,
    /// Claim name read from a verified bearer token.
    pub claim_name: String,
    /// Base domain for subdomain resolution (`{tenant}.{base_domain}`).
    /// Subdomain resolution is disabled when unset.
    pub base_domain: Option<String>,
    /// Order in which signal sources are consulted. First valid one wins.
    pub precedence: Vec<TenantSignalSource>,
    /// Reject requests without a resolvable tenant.
    pub require_tenant: bool,
    /// Reject requests whose lower-precedence signals name another tenant.
    pub reject_conflicting_signals: bool,
    /// Verifier for bearer tokens. Without one, only a claim already
    /// verified upstream is used.
    pub claim_verifier: Option<ClaimVerifier>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            claim_name: DEFAULT_CLAIM_NAME.to_string(),
            base_domain: None,
            precedence: TenantSignalSource::DEFAULT_PRECEDENCE.to_vec(),
            require_tenant: true,
            reject_conflicting_signals: true,
            claim_verifier: None,
        }
    }
}

impl TenantConfig {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> TenantConfigBuilder {
        TenantConfigBuilder::default()
    }
}

/// Builder for [`TenantConfig`].
#[derive(Debug, Default)]
pub struct TenantConfigBuilder {
    config: TenantConfig,
}

impl TenantConfigBuilder {
    #[must_use]
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.config.header_name = name.into();
        self
    }

    #[must_use]
    pub fn claim_name(mut self, name: impl Into<String>) -> Self {
        self.config.claim_name = name.into();
        self
    }

    /// Enable subdomain resolution under `domain`. Leading dots and case
    /// are normalized.
    #[must_use]
    pub fn base_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        self.config.base_domain = (!domain.is_empty()).then_some(domain);
        self
    }

    /// Replace the source order. Duplicates are dropped, keeping the first.
    #[must_use]
    pub fn precedence(mut self, order: impl IntoIterator<Item = TenantSignalSource>) -> Self {
        let mut deduped = Vec::new();
        for source in order {
            if !deduped.contains(&source) {
                deduped.push(source);
            }
        }
        self.config.precedence = deduped;
        self
    }

    #[must_use]
    pub fn require_tenant(mut self, require: bool) -> Self {
        self.config.require_tenant = require;
        self
    }

    #[must_use]
    pub fn reject_conflicting_signals(mut self, reject: bool) -> Self {
        self.config.reject_conflicting_signals = reject;
        self
    }

    #[must_use]
    pub fn claim_verifier(mut self, verifier: ClaimVerifier) -> Self {
        self.config.claim_verifier = Some(verifier);
        self
    }

    #[must_use]
    pub fn build(self) -> TenantConfig {
        self.config
    }
}
