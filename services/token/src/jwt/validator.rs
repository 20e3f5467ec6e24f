//! Local access token validation against the issuer's own key ring.

use crate::config::Config;
use crate::error::TokenError;
use crate::keys::KeyRing;
use auth_common::{inspect_header, verify_token, AccessClaims, ValidationPolicy};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Validates access tokens with in-process keys.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: Arc<KeyRing>,
    policy: ValidationPolicy,
}

impl TokenValidator {
    /// Create a validator.
    #[must_use]
    pub const fn new(keys: Arc<KeyRing>, policy: ValidationPolicy) -> Self {
        Self { keys, policy }
    }

    /// Create a validator requiring the configured issuer and audience.
    #[must_use]
    pub fn from_config(keys: Arc<KeyRing>, config: &Config) -> Self {
        let policy = ValidationPolicy::default()
            .with_issuer(config.issuer.clone())
            .with_audience(config.audience.clone())
            .with_leeway(config.leeway);
        Self::new(keys, policy)
    }

    /// Validation policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate `token` now.
    ///
    /// # Errors
    ///
    /// [`TokenError::TokenExpired`] if the token is genuine but expired,
    /// [`TokenError::TokenInvalid`] for every other rejection.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.validate_access_token_at(token, Utc::now())
    }

    /// Validate `token` as of `now`.
    ///
    /// # Errors
    ///
    /// [`TokenError::TokenExpired`] if the token is genuine but expired,
    /// [`TokenError::TokenInvalid`] for every other rejection.
    pub fn validate_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, TokenError> {
        let header = inspect_header(token)?;
        let identity = self.keys.find(&header.key_id, now).ok_or_else(|| {
            debug!(kid = %header.key_id, "Access token signed with untrusted key");
            TokenError::TokenInvalid {
                reason: "unknown key id",
            }
        })?;

        verify_token(token, identity.verification_key(), &self.policy, now).map_err(|e| {
            debug!(kid = %header.key_id, error = %e, "Access token rejected");
            e.into()
        })
    }
}
