//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a missing `DATABASE_URL` or an unparsable value
//! stops startup with a clear error instead of falling back silently.

use shopdesk_api::{RateGuardConfig, RateQuota};
use shopdesk_db::PoolConfig;
use shopdesk_tenant::{ClaimVerifier, TenantConfig, DEFAULT_CLAIM_NAME, DEFAULT_HEADER_NAME};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Key material for verifying the tenant claim of bearer tokens.
#[derive(Clone)]
pub enum ClaimKey {
    Hs256Secret(String),
    Rs256PublicKey(String),
}

impl std::fmt::Debug for ClaimKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hs256Secret(_) => f.write_str("Hs256Secret([REDACTED])"),
            Self::Rs256PublicKey(_) => f.write_str("Rs256PublicKey(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub rust_log: String,

    pub tenant_header: String,
    pub tenant_claim: String,
    pub tenant_base_domain: Option<String>,
    pub tenant_jwt_key: Option<ClaimKey>,
    pub tenant_jwt_issuer: Option<String>,

    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,

    pub idempotency_ttl_hours: i64,
    pub idempotency_sweep_interval_secs: u64,
    pub policy_audit_interval_secs: u64,

    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub max_body_size: usize,
    pub request_body_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Required Variables
    ///
    /// - `DATABASE_URL` - request role connection string (must not bypass RLS)
    ///
    /// # Optional Variables
    ///
    /// - `HOST` / `PORT` - bind address (default `0.0.0.0:8080`)
    /// - `RUST_LOG` - log filter (default `info`)
    /// - `TENANT_HEADER` / `TENANT_CLAIM` / `TENANT_BASE_DOMAIN`
    /// - `TENANT_JWT_SECRET` or `TENANT_JWT_PUBLIC_KEY`, `TENANT_JWT_ISSUER`
    /// - `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_WINDOW_SECS` (default 600 / 60)
    /// - `IDEMPOTENCY_TTL_HOURS` (default 24), `IDEMPOTENCY_SWEEP_INTERVAL_SECS` (default 3600)
    /// - `POLICY_AUDIT_INTERVAL_SECS` (default 300)
    /// - `DB_MAX_CONNECTIONS` (default 10), `DB_ACQUIRE_TIMEOUT_SECS` (default 5)
    /// - `MAX_BODY_SIZE` in bytes (default 1 MiB)
    /// - `REQUEST_BODY_TIMEOUT_SECS` per body chunk (default 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url =
            get("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".into()))?;

        let port: u16 = parse_or(&get, "PORT", 8080)?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".into(),
                message: "Port must be between 1 and 65535".into(),
            });
        }

        let tenant_jwt_key = match (get("TENANT_JWT_SECRET"), get("TENANT_JWT_PUBLIC_KEY")) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidValue {
                    var: "TENANT_JWT_SECRET".into(),
                    message: "set either TENANT_JWT_SECRET or TENANT_JWT_PUBLIC_KEY, not both"
                        .into(),
                });
            }
            (Some(secret), None) => Some(ClaimKey::Hs256Secret(secret)),
            (None, Some(pem)) => {
                if !pem.contains("-----BEGIN") {
                    return Err(ConfigError::InvalidValue {
                        var: "TENANT_JWT_PUBLIC_KEY".into(),
                        message: "Must be PEM format (should contain -----BEGIN)".into(),
                    });
                }
                Some(ClaimKey::Rs256PublicKey(pem))
            }
            (None, None) => None,
        };

        let config = Self {
            database_url,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".into()),
            tenant_header: get("TENANT_HEADER").unwrap_or_else(|| DEFAULT_HEADER_NAME.into()),
            tenant_claim: get("TENANT_CLAIM").unwrap_or_else(|| DEFAULT_CLAIM_NAME.into()),
            tenant_base_domain: get("TENANT_BASE_DOMAIN"),
            tenant_jwt_key,
            tenant_jwt_issuer: get("TENANT_JWT_ISSUER"),
            rate_limit_requests: parse_or(&get, "RATE_LIMIT_REQUESTS", 600)?,
            rate_limit_window_secs: parse_or(&get, "RATE_LIMIT_WINDOW_SECS", 60)?,
            idempotency_ttl_hours: parse_or(&get, "IDEMPOTENCY_TTL_HOURS", 24)?,
            idempotency_sweep_interval_secs: parse_or(&get, "IDEMPOTENCY_SWEEP_INTERVAL_SECS", 3600)?,
            policy_audit_interval_secs: parse_or(&get, "POLICY_AUDIT_INTERVAL_SECS", 300)?,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_secs: parse_or(&get, "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            max_body_size: parse_or(&get, "MAX_BODY_SIZE", 1024 * 1024)?,
            request_body_timeout_secs: parse_or(&get, "REQUEST_BODY_TIMEOUT_SECS", 30)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("RATE_LIMIT_REQUESTS", u64::from(self.rate_limit_requests)),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs),
            ("IDEMPOTENCY_SWEEP_INTERVAL_SECS", self.idempotency_sweep_interval_secs),
            ("POLICY_AUDIT_INTERVAL_SECS", self.policy_audit_interval_secs),
            ("DB_MAX_CONNECTIONS", u64::from(self.db_max_connections)),
            ("DB_ACQUIRE_TIMEOUT_SECS", self.db_acquire_timeout_secs),
            ("MAX_BODY_SIZE", self.max_body_size as u64),
            ("REQUEST_BODY_TIMEOUT_SECS", self.request_body_timeout_secs),
        ];
        for (var, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    var: var.into(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        if self.idempotency_ttl_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                var: "IDEMPOTENCY_TTL_HOURS".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Socket address to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tenant resolver configuration.
    pub fn tenant_config(&self) -> Result<TenantConfig, ConfigError> {
        let mut builder = TenantConfig::builder()
            .header_name(self.tenant_header.clone())
            .claim_name(self.tenant_claim.clone())
            .require_tenant(true);

        if let Some(domain) = &self.tenant_base_domain {
            builder = builder.base_domain(domain.clone());
        }

        if let Some(key) = &self.tenant_jwt_key {
            let mut verifier = match key {
                ClaimKey::Hs256Secret(secret) => ClaimVerifier::hs256(secret.as_bytes()),
                ClaimKey::Rs256PublicKey(pem) => ClaimVerifier::rs256_pem(pem.as_bytes())
                    .map_err(|e| ConfigError::InvalidValue {
                        var: "TENANT_JWT_PUBLIC_KEY".into(),
                        message: e.to_string(),
                    })?,
            };
            if let Some(issuer) = &self.tenant_jwt_issuer {
                verifier = verifier.with_issuer(issuer);
            }
            builder = builder.claim_verifier(verifier);
        }

        Ok(builder.build())
    }

    #[must_use]
    pub fn rate_guard_config(&self) -> RateGuardConfig {
        RateGuardConfig::new(RateQuota::new(
            self.rate_limit_requests,
            self.rate_limit_window_secs,
        ))
    }

    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.db_max_connections,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
            ..PoolConfig::default()
        }
    }

    #[must_use]
    pub fn request_body_timeout(&self) -> Duration {
        Duration::from_secs(self.request_body_timeout_secs)
    }

    #[must_use]
    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.idempotency_ttl_hours)
    }
}

fn parse_or<T, G>(get: &G, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: var.into(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
