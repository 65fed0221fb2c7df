//! Tenant resolution from request attributes.
//!
//! Three signal sources are supported: a verified token claim, an explicit
//! header and the request subdomain. They are consulted in the configured
//! order (claim, header, subdomain by default) and the first one that
//! carries a value decides the tenant. A value that is present but malformed
//! is an error; resolution never skips past it to a lower-precedence source.

use crate::config::TenantConfig;
use crate::error::TenantError;
use http::header::{AUTHORIZATION, HOST};
use http::Request;
use serde_json::Value;
use shopdesk_core::TenantId;

/// A tenant claim already verified by upstream authentication middleware.
///
/// When present in request extensions it is used as the claim signal and no
/// bearer token is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTenantClaim(pub String);

/// Where a tenant id can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantSignalSource {
    /// Tenant claim of a verified bearer token.
    Claim,
    /// Explicit tenant header.
    Header,
    /// Leftmost label of the `Host` under the configured base domain.
    Subdomain,
}

impl TenantSignalSource {
    /// Default order: claim, then header, then subdomain.
    pub const DEFAULT_PRECEDENCE: [TenantSignalSource; 3] = [Self::Claim, Self::Header, Self::Subdomain];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Header => "header",
            Self::Subdomain => "subdomain",
        }
    }

    /// Raw signal value, `None` when this source carries nothing.
    fn read<B>(&self, req: &Request<B>, config: &TenantConfig) -> Result<Option<String>, TenantError> {
        match self {
            Self::Claim => read_claim(req, config),
            Self::Header => read_header(req, &config.header_name),
            Self::Subdomain => Ok(config
                .base_domain
                .as_deref()
                .and_then(|base| read_subdomain(req, base))),
        }
    }
}

impl std::fmt::Display for TenantSignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved tenant of the current request.
///
/// Inserted into request extensions by the tenant layer:
///
/// ```rust,ignore
/// use axum::Extension;
/// use shopdesk_tenant::TenantContext;
///
/// async fn handler(Extension(ctx): Extension<TenantContext>) -> String {
///     format!("Tenant: {}", ctx.tenant_id())
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    source: TenantSignalSource,
}

impl TenantContext {
    #[must_use]
    pub fn new(tenant_id: TenantId, source: TenantSignalSource) -> Self {
        Self { tenant_id, source }
    }

    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Source that supplied the tenant id.
    #[must_use]
    pub fn source(&self) -> TenantSignalSource {
        self.source
    }
}

impl From<TenantContext> for TenantId {
    fn from(ctx: TenantContext) -> Self {
        ctx.tenant_id
    }
}

/// Resolve the tenant of `req`.
///
/// # Errors
///
/// * `TenantError::Missing` if no source carries a value.
/// * `TenantError::InvalidFormat` if the winning value is not a non-nil UUID.
/// * `TenantError::InvalidClaim` if a bearer token fails verification.
/// * `TenantError::Conflicting` if a lower-precedence source names a
///   different tenant and conflicting signals are rejected.
pub fn resolve_tenant<B>(req: &Request<B>, config: &TenantConfig) -> Result<TenantContext, TenantError> {
    let mut winner: Option<TenantContext> = None;

    for source in &config.precedence {
        let Some(raw) = source.read(req, config)? else {
            continue;
        };
        let tenant_id = parse_tenant_id(*source, &raw)?;

        match winner {
            None => {
                winner = Some(TenantContext::new(tenant_id, *source));
                if !config.reject_conflicting_signals {
                    break;
                }
            }
            Some(ctx) if ctx.tenant_id() != tenant_id => {
                return Err(TenantError::Conflicting {
                    winner: ctx.source(),
                    other: *source,
                });
            }
            Some(_) => {}
        }
    }

    winner.ok_or(TenantError::Missing)
}

/// Parse and validate a tenant id. The nil UUID is never a tenant.
pub fn parse_tenant_id(source: TenantSignalSource, raw: &str) -> Result<TenantId, TenantError> {
    let trimmed = raw.trim();
    let tenant_id = trimmed.parse::<TenantId>().map_err(|_| TenantError::InvalidFormat {
        signal: source,
        message: format!("'{trimmed}' is not a valid UUID"),
    })?;
    if tenant_id.is_nil() {
        return Err(TenantError::InvalidFormat {
            signal: source,
            message: "nil UUID is not a tenant".to_string(),
        });
    }
    Ok(tenant_id)
}

fn read_header<B>(req: &Request<B>, header_name: &str) -> Result<Option<String>, TenantError> {
    let Some(value) = req.headers().get(header_name) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| TenantError::InvalidFormat {
        signal: TenantSignalSource::Header,
        message: "header value is not valid UTF-8".to_string(),
    })?;
    let trimmed = value.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn read_claim<B>(req: &Request<B>, config: &TenantConfig) -> Result<Option<String>, TenantError> {
    if let Some(VerifiedTenantClaim(value)) = req.extensions().get::<VerifiedTenantClaim>() {
        return Ok(Some(value.clone()));
    }

    let Some(verifier) = &config.claim_verifier else {
        return Ok(None);
    };
    let Some(token) = bearer_token(req) else {
        return Ok(None);
    };

    let claims = verifier
        .verify(token)
        .map_err(|e| TenantError::InvalidClaim(e.to_string()))?;

    match claims.get(&config.claim_name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(TenantError::InvalidClaim(format!(
            "claim '{}' is not a string",
            config.claim_name
        ))),
    }
}

fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn read_subdomain<B>(req: &Request<B>, base_domain: &str) -> Option<String> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())?;
    let host = strip_port(host.trim()).to_ascii_lowercase();

    let prefix = host.strip_suffix(base_domain)?.strip_suffix('.')?;
    let label = prefix.split('.').next().unwrap_or_default();
    (!label.is_empty()).then(|| label.to_string())
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimVerifier;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde_json::json;

    const TENANT_A: &str = "550e8400-e29b-41d4-a716-446655440000";
    const TENANT_B: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
    const SECRET: &[u8] = b"tenant-claim-test-secret-value!!";

    fn config() -> TenantConfig {
        TenantConfig::builder()
            .base_domain("shops.example.com")
            .claim_verifier(ClaimVerifier::hs256(SECRET))
            .build()
    }

    fn bearer(tid: Value) -> String {
        let claims = json!({"sub": "user-1", "tid": tid, "exp": get_current_timestamp() + 300});
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        format!("Bearer {token}")
    }

    fn request() -> http::request::Builder {
        Request::builder().uri("/appointments")
    }

    mod header_tests {
        use super::*;

        #[test]
        fn test_valid_header() {
            let req = request().header("X-Tenant-Id", TENANT_A).body(()).unwrap();
            let ctx = resolve_tenant(&req, &config()).unwrap();
            assert_eq!(ctx.tenant_id().to_string(), TENANT_A);
            assert_eq!(ctx.source(), TenantSignalSource::Header);
        }

        #[test]
        fn test_header_name_is_case_insensitive() {
            let req = request().header("x-tenant-id", TENANT_A).body(()).unwrap();
            assert!(resolve_tenant(&req, &config()).is_ok());
        }

        #[test]
        fn test_header_whitespace_trimmed() {
            let req = request().header("X-Tenant-Id", format!("  {TENANT_A} ")).body(()).unwrap();
            assert!(resolve_tenant(&req, &config()).is_ok());
        }

        #[test]
        fn test_empty_header_is_missing() {
            let req = request().header("X-Tenant-Id", "").body(()).unwrap();
            assert!(matches!(resolve_tenant(&req, &config()), Err(TenantError::Missing)));
        }

        #[test]
        fn test_malformed_header_rejected() {
            let req = request().header("X-Tenant-Id", "shop-42").body(()).unwrap();
            assert!(matches!(
                resolve_tenant(&req, &config()),
                Err(TenantError::InvalidFormat { signal: TenantSignalSource::Header, .. })
            ));
        }

        #[test]
        fn test_nil_uuid_rejected() {
            let req = request()
                .header("X-Tenant-Id", "00000000-0000-0000-0000-000000000000")
                .body(())
                .unwrap();
            assert!(matches!(
                resolve_tenant(&req, &config()),
                Err(TenantError::InvalidFormat { .. })
            ));
        }
    }

    mod claim_tests {
        use super::*;

        #[test]
        fn test_claim_wins_over_header_when_equal() {
            let req = request()
                .header("Authorization", bearer(json!(TENANT_A)))
                .header("X-Tenant-Id", TENANT_A)
                .body(())
                .unwrap();
            let ctx = resolve_tenant(&req, &config()).unwrap();
            assert_eq!(ctx.source(), TenantSignalSource::Claim);
        }

        #[test]
        fn test_spoofed_header_rejected() {
            let req = request()
                .header("Authorization", bearer(json!(TENANT_A)))
                .header("X-Tenant-Id", TENANT_B)
                .body(())
                .unwrap();
            assert!(matches!(
                resolve_tenant(&req, &config()),
                Err(TenantError::Conflicting {
                    winner: TenantSignalSource::Claim,
                    other: TenantSignalSource::Header
                })
            ));
        }

        #[test]
        fn test_conflict_ignored_when_disabled() {
            let config = TenantConfig::builder()
                .claim_verifier(ClaimVerifier::hs256(SECRET))
                .reject_conflicting_signals(false)
                .build();
            let req = request()
                .header("Authorization", bearer(json!(TENANT_A)))
                .header("X-Tenant-Id", TENANT_B)
                .body(())
                .unwrap();
            let ctx = resolve_tenant(&req, &config).unwrap();
            assert_eq!(ctx.tenant_id().to_string(), TENANT_A);
        }

        #[test]
        fn test_invalid_token_does_not_fall_through() {
            let req = request()
                .header("Authorization", "Bearer forged.token.value")
                .header("X-Tenant-Id", TENANT_A)
                .body(())
                .unwrap();
            assert!(matches!(
                resolve_tenant(&req, &config()),
                Err(TenantError::InvalidClaim(_))
            ));
        }

        #[test]
        fn test_non_string_claim_rejected() {
            let req = request().header("Authorization", bearer(json!(42))).body(()).unwrap();
            assert!(matches!(
                resolve_tenant(&req, &config()),
                Err(TenantError::InvalidClaim(_))
            ));
        }

        #[test]
        fn test_token_without_claim_falls_back_to_header() {
            let req = request()
                .header("Authorization", bearer(Value::Null))
                .header("X-Tenant-Id", TENANT_B)
                .body(())
                .unwrap();
            let ctx = resolve_tenant(&req, &config()).unwrap();
            assert_eq!(ctx.source(), TenantSignalSource::Header);
        }

        #[test]
        fn test_upstream_verified_claim_used() {
            let mut req = request().body(()).unwrap();
            req.extensions_mut()
                .insert(VerifiedTenantClaim(TENANT_B.to_string()));
            let ctx = resolve_tenant(&req, &TenantConfig::default()).unwrap();
            assert_eq!(ctx.tenant_id().to_string(), TENANT_B);
            assert_eq!(ctx.source(), TenantSignalSource::Claim);
        }

        #[test]
        fn test_bearer_ignored_without_verifier() {
            let req = request()
                .header("Authorization", bearer(json!(TENANT_A)))
                .body(())
                .unwrap();
            assert!(matches!(
                resolve_tenant(&req, &TenantConfig::default()),
                Err(TenantError::Missing)
            ));
        }

        #[test]
        fn test_basic_auth_is_not_a_claim() {
            let req = request()
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .header("X-Tenant-Id", TENANT_A)
                .body(())
                .unwrap();
            assert!(resolve_tenant(&req, &config()).is_ok());
        }
    }

    mod subdomain_tests {
        use super::*;

        #[test]
        fn test_subdomain_resolves() {
            let req = request()
                .header("Host", format!("{TENANT_A}.shops.example.com:8443"))
                .body(())
                .unwrap();
            let ctx = resolve_tenant(&req, &config()).unwrap();
            assert_eq!(ctx.source(), TenantSignalSource::Subdomain);
            assert_eq!(ctx.tenant_id().to_string(), TENANT_A);
        }

        #[test]
        fn test_other_domain_ignored() {
            let req = request()
                .header("Host", format!("{TENANT_A}.evil.example.org"))
                .body(())
                .unwrap();
            assert!(matches!(resolve_tenant(&req, &config()), Err(TenantError::Missing)));
        }

        #[test]
        fn test_suffix_lookalike_ignored() {
            let req = request()
                .header("Host", format!("{TENANT_A}.badshops.example.com"))
                .body(())
                .unwrap();
            assert!(matches!(resolve_tenant(&req, &config()), Err(TenantError::Missing)));
        }

        #[test]
        fn test_bare_base_domain_has_no_tenant() {
            let req = request().header("Host", "shops.example.com").body(()).unwrap();
            assert!(matches!(resolve_tenant(&req, &config()), Err(TenantError::Missing)));
        }

        #[test]
        fn test_subdomain_conflicting_with_header() {
            let req = request()
                .header("X-Tenant-Id", TENANT_A)
                .header("Host", format!("{TENANT_B}.shops.example.com"))
                .body(())
                .unwrap();
            assert!(matches!(
                resolve_tenant(&req, &config()),
                Err(TenantError::Conflicting { .. })
            ));
        }

        #[test]
        fn test_subdomain_disabled_without_base_domain() {
            let req = request()
                .header("Host", format!("{TENANT_A}.shops.example.com"))
                .body(())
                .unwrap();
            assert!(matches!(
                resolve_tenant(&req, &TenantConfig::default()),
                Err(TenantError::Missing)
            ));
        }
    }

    #[test]
    fn test_custom_precedence() {
        let config = TenantConfig::builder()
            .base_domain("shops.example.com")
            .precedence([TenantSignalSource::Subdomain, TenantSignalSource::Header])
            .reject_conflicting_signals(false)
            .build();
        let req = request()
            .header("X-Tenant-Id", TENANT_A)
            .header("Host", format!("{TENANT_B}.shops.example.com"))
            .body(())
            .unwrap();
        let ctx = resolve_tenant(&req, &config).unwrap();
        assert_eq!(ctx.source(), TenantSignalSource::Subdomain);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("a.example.com:8080"), "a.example.com");
        assert_eq!(strip_port("a.example.com"), "a.example.com");
    }
}
