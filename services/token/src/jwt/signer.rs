//! Access and refresh token issuance.

use crate::config::Config;
use crate::error::TokenError;
use crate::keys::KeyRing;
use crate::refresh::RefreshTokenGenerator;
use auth_common::{AccessClaims, SubjectInfo};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Header};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

/// A freshly issued refresh token.
///
/// The plaintext is handed to the client exactly once; only the hash is
/// ever stored.
pub struct IssuedRefreshToken {
    plaintext: Zeroizing<String>,
    token_hash: String,
    subject_id: u64,
    expires_at: DateTime<Utc>,
}

impl IssuedRefreshToken {
    /// Opaque token for the client.
    #[must_use]
    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    /// Storage hash of the token.
    #[must_use]
    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    /// Subject the token was issued to.
    #[must_use]
    pub const fn subject_id(&self) -> u64 {
        self.subject_id
    }

    /// Expiry of the token.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for IssuedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedRefreshToken")
            .field("plaintext", &"[REDACTED]")
            .field("subject_id", &self.subject_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Issues signed access tokens and opaque refresh tokens.
///
/// Stateless per call: the only shared state is the key ring.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    keys: Arc<KeyRing>,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    /// Create a signer.
    #[must_use]
    pub fn new(
        keys: Arc<KeyRing>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create a signer from service configuration.
    #[must_use]
    pub fn from_config(keys: Arc<KeyRing>, config: &Config) -> Self {
        Self::new(
            keys,
            config.issuer.clone(),
            config.audience.clone(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token for `subject`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if the active key cannot sign.
    pub fn issue_access_token(&self, subject: &SubjectInfo) -> Result<String, TokenError> {
        self.issue_access_token_at(subject, Utc::now())
    }

    /// Issue an access token for `subject`, valid from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if the active key cannot sign.
    pub fn issue_access_token_at(
        &self,
        subject: &SubjectInfo,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let identity = self.keys.active();
        let claims = AccessClaims::issue(subject, &self.issuer, &self.audience, now, self.access_ttl);

        let mut header = Header::new(identity.algorithm().to_jwt());
        header.kid = Some(identity.key_id().to_string());

        let token = encode(&header, &claims, identity.encoding_key())
            .map_err(|e| TokenError::signing(e.to_string()))?;

        debug!(
            subject_id = subject.subject_id,
            kid = %identity.key_id(),
            exp = claims.expires_at(),
            "Issued access token"
        );
        Ok(token)
    }

    /// Issue a refresh token for `subject_id`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::RandomSource`] if the entropy source fails.
    pub fn issue_refresh_token(&self, subject_id: u64) -> Result<IssuedRefreshToken, TokenError> {
        self.issue_refresh_token_at(subject_id, Utc::now())
    }

    /// Issue a refresh token for `subject_id`, valid from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::RandomSource`] if the entropy source fails.
    pub fn issue_refresh_token_at(
        &self,
        subject_id: u64,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefreshToken, TokenError> {
        let plaintext = RefreshTokenGenerator::generate()?;
        let token_hash = RefreshTokenGenerator::hash(&plaintext);
        let ttl = chrono::Duration::from_std(self.refresh_ttl)
            .map_err(|_| TokenError::config("refresh token TTL out of range"))?;

        Ok(IssuedRefreshToken {
            plaintext,
            token_hash,
            subject_id,
            expires_at: now + ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningIdentity;
    use auth_common::inspect_header;
    use test_utils::{fixed_now, sample_subject, HMAC_SECRET, RSA_PRIMARY_PEM};

    fn signer(identity: SigningIdentity) -> TokenSigner {
        TokenSigner::new(
            Arc::new(KeyRing::new(identity)),
            "auth-service",
            "platform-api",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_header_carries_kid_and_alg() {
        let signer = signer(SigningIdentity::rsa_from_pem("rs-1", RSA_PRIMARY_PEM).unwrap());
        let token = signer.issue_access_token(&sample_subject()).unwrap();

        let header = inspect_header(&token).unwrap();
        assert_eq!(header.key_id, "rs-1");
        assert_eq!(header.algorithm.as_str(), "RS256");
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_refresh_token_shape() {
        let signer = signer(SigningIdentity::hmac("hs-1", HMAC_SECRET).unwrap());
        let issued = signer.issue_refresh_token_at(42, fixed_now()).unwrap();

        assert_eq!(issued.plaintext().len(), 43);
        assert_eq!(issued.token_hash(), RefreshTokenGenerator::hash(issued.plaintext()));
        assert_eq!(issued.subject_id(), 42);
        assert_eq!(issued.expires_at(), fixed_now() + chrono::Duration::seconds(3600));
    }

    #[test]
    fn test_refresh_token_debug_redacted() {
        let signer = signer(SigningIdentity::hmac("hs-1", HMAC_SECRET).unwrap());
        let issued = signer.issue_refresh_token(1).unwrap();
        assert!(!format!("{issued:?}").contains(issued.plaintext()));
    }
}
