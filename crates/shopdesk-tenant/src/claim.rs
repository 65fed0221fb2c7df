//! Bearer token verification for the claim signal source.
//!
//! Identity is issued upstream; this module only checks the signature and
//! registered claims of the token so its tenant claim can be trusted.

use jsonwebtoken::{decode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while verifying a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// The configured verification key is unusable.
    #[error("Invalid verification key: {0}")]
    InvalidKey(String),

    /// Token has expired.
    #[error("Token expired")]
    Expired,

    /// Signature, format or registered claims are invalid.
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Verifies bearer tokens and returns their claims.
#[derive(Clone)]
pub struct ClaimVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("issuer", &self.validation.iss)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ClaimVerifier {
    /// Verifier for HS256 tokens signed with a shared secret.
    #[must_use]
    pub fn hs256(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// Verifier for RS256 tokens, given the issuer's public key in PEM form.
    pub fn rs256_pem(public_key_pem: &[u8]) -> Result<Self, ClaimError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| ClaimError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key, Algorithm::RS256))
    }

    fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.leeway = 60;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_aud = false;
        Self { key, validation }
    }

    /// Require the `iss` claim to equal `issuer`.
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Require the `aud` claim to contain `audience`.
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    /// Clock skew tolerance in seconds.
    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    /// Verify `token` and return its claims.
    pub fn verify(&self, token: &str) -> Result<Map<String, Value>, ClaimError> {
        decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => ClaimError::Expired,
                _ => ClaimError::InvalidToken(e.to_string()),
            })
    }
}
