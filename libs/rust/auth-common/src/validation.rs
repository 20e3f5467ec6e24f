//! Access token validation shared by the issuer and resource servers.
//!
//! Validation runs in a fixed order: header inspection, algorithm and key
//! ID match against the selected key, signature and issuer/audience checks,
//! claim decode, and finally expiry against the caller's clock. Expiry is
//! checked last so that only genuine tokens are ever reported as expired.

use crate::algorithm::SigningAlgorithm;
use crate::claims::AccessClaims;
use crate::error::ValidationError;
use crate::jwks::VerificationKey;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Validation};
use std::time::Duration;

/// Default clock-skew leeway applied to `exp`.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(5);

/// Issuer, audience and clock settings for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Required issuer, if configured
    pub issuer: Option<String>,
    /// Required audience, if configured
    pub audience: Option<String>,
    /// Leeway applied to the expiry check
    pub leeway: Duration,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            leeway: DEFAULT_LEEWAY,
        }
    }
}

impl ValidationPolicy {
    /// Require an exact issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require an exact audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the expiry leeway.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    fn leeway_secs(&self) -> i64 {
        i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX)
    }

    fn jwt_validation(&self, algorithm: SigningAlgorithm) -> Validation {
        let mut validation = Validation::new(algorithm.to_jwt());
        // Expiry is evaluated after decode against the caller's clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud"]);

        match &self.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

/// Parts of a token header needed to select a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared key ID
    pub key_id: String,
    /// Declared algorithm
    pub algorithm: SigningAlgorithm,
}

/// Read the header of an unverified token.
///
/// # Errors
///
/// Returns [`ValidationError::Invalid`] for anything that is not a compact
/// JWS with a supported `alg` and a non-empty `kid`.
pub fn inspect_header(token: &str) -> Result<TokenHeader, ValidationError> {
    let header = decode_header(token).map_err(|_| ValidationError::invalid("malformed token"))?;
    let algorithm = SigningAlgorithm::from_jwt(header.alg)
        .ok_or(ValidationError::invalid("algorithm not accepted"))?;
    let key_id = header
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(ValidationError::invalid("missing key id"))?;

    Ok(TokenHeader { key_id, algorithm })
}

/// Verify `token` with `key` and return its claims.
///
/// # Errors
///
/// Returns [`ValidationError::Expired`] when the token is genuine but past
/// `exp` plus leeway at `now`, and [`ValidationError::Invalid`] for every
/// other rejection.
pub fn verify_token(
    token: &str,
    key: &VerificationKey,
    policy: &ValidationPolicy,
    now: DateTime<Utc>,
) -> Result<AccessClaims, ValidationError> {
    let header = inspect_header(token)?;
    if header.algorithm != key.algorithm() {
        return Err(ValidationError::invalid("algorithm mismatch"));
    }
    if header.key_id != key.key_id() {
        return Err(ValidationError::invalid("key id mismatch"));
    }

    let validation = policy.jwt_validation(key.algorithm());
    let data = decode::<AccessClaims>(token, key.decoding_key(), &validation)?;
    let claims = data.claims;

    if claims.is_expired_at(now.timestamp(), policy.leeway_secs()) {
        return Err(ValidationError::Expired {
            expired_at: claims.expires_at_utc(),
        });
    }

    Ok(claims)
}
