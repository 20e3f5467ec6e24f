//! Login, refresh and logout over the token primitives.
//!
//! User storage and password hashing are external capabilities consumed
//! through [`UserDirectory`] and [`PasswordHasher`].

use crate::error::TokenError;
use crate::jwt::{IssuedRefreshToken, TokenSigner};
use crate::refresh::RefreshTokenRotator;
use async_trait::async_trait;
use auth_common::SubjectInfo;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Password hashing primitive.
pub trait PasswordHasher: Send + Sync {
    /// Hash a password for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails.
    fn hash(&self, password: &str) -> Result<String, TokenError>;

    /// Check `password` against a stored digest.
    fn verify(&self, digest: &str, password: &str) -> bool;
}

/// A user as seen by the token service.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Claims-relevant attributes
    pub subject: SubjectInfo,
    /// Stored password digest
    pub password_digest: String,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// User lookup capability.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, TokenError>;

    /// Find a user by subject ID.
    async fn find_by_id(&self, subject_id: u64) -> Result<Option<UserRecord>, TokenError>;
}

/// Access and refresh token handed to a client.
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,
    /// Access token lifetime
    pub expires_in: Duration,
    /// Opaque refresh token
    pub refresh_token: IssuedRefreshToken,
    /// Rotation family of the refresh token
    pub family_id: String,
}

impl TokenPair {
    /// Token type for the `Authorization` header.
    pub const TOKEN_TYPE: &'static str = "Bearer";
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token)
            .field("family_id", &self.family_id)
            .finish()
    }
}

/// Credential exchange service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    hasher: Arc<dyn PasswordHasher>,
    signer: TokenSigner,
    rotator: RefreshTokenRotator,
}

impl AuthService {
    /// Create the service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        hasher: Arc<dyn PasswordHasher>,
        signer: TokenSigner,
        rotator: RefreshTokenRotator,
    ) -> Self {
        Self {
            users,
            hasher,
            signer,
            rotator,
        }
    }

    /// Exchange email and password for a new token pair.
    ///
    /// # Errors
    ///
    /// [`TokenError::Unauthorized`] for unknown users and wrong passwords
    /// alike; signing, entropy and storage failures otherwise.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, TokenError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            info!("Login rejected");
            return Err(TokenError::unauthorized("invalid credentials"));
        };
        if !self.hasher.verify(&user.password_digest, password) {
            info!(subject_id = user.subject.subject_id, "Login rejected");
            return Err(TokenError::unauthorized("invalid credentials"));
        }

        let access_token = self.signer.issue_access_token(&user.subject)?;
        let grant = self.rotator.start_session(user.subject.subject_id).await?;

        info!(
            subject_id = user.subject.subject_id,
            family_id = %grant.record.family_id,
            "Login succeeded"
        );

        Ok(TokenPair {
            access_token,
            expires_in: self.signer.access_ttl(),
            refresh_token: grant.token,
            family_id: grant.record.family_id,
        })
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The access token carries the subject's current email and role. The
    /// presented token is consumed last, so a failure while resolving the
    /// subject or signing leaves it exchangeable.
    ///
    /// # Errors
    ///
    /// [`TokenError::Unauthorized`] if the token is not exchangeable or the
    /// subject no longer exists; [`TokenError::RotationConflict`] on replay.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let current = self.rotator.validate(refresh_token).await?;

        let Some(user) = self.users.find_by_id(current.subject_id).await? else {
            warn!(
                subject_id = current.subject_id,
                family_id = %current.family_id,
                "Refresh for unknown subject; revoking family"
            );
            self.rotator.revoke_family(&current.family_id).await?;
            return Err(TokenError::unauthorized("subject not found"));
        };

        let access_token = self.signer.issue_access_token(&user.subject)?;
        let grant = self.rotator.rotate(refresh_token).await?;
        Ok(TokenPair {
            access_token,
            expires_in: self.signer.access_ttl(),
            refresh_token: grant.token,
            family_id: grant.record.family_id,
        })
    }

    /// Revoke a refresh token. Succeeds for unknown or already revoked tokens.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger fails.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), TokenError> {
        self.rotator.revoke(refresh_token).await?;
        Ok(())
    }
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::TokenValidator;
    use crate::keys::{KeyRing, SigningIdentity};
    use crate::storage::InMemoryLedger;
    use auth_common::ValidationPolicy;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use test_utils::{sample_subject, HMAC_SECRET};

    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String, TokenError> {
            Ok(format!("plain:{password}"))
        }

        fn verify(&self, digest: &str, password: &str) -> bool {
            digest == format!("plain:{password}")
        }
    }

    #[derive(Default)]
    struct Users {
        by_id: Mutex<HashMap<u64, UserRecord>>,
        offline: AtomicBool,
    }

    #[async_trait]
    impl UserDirectory for Users {
        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, TokenError> {
            Ok(self.by_id.lock().values().find(|u| u.subject.email == email).cloned())
        }

        async fn find_by_id(&self, subject_id: u64) -> Result<Option<UserRecord>, TokenError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(TokenError::Storage("directory offline".to_string()));
            }
            Ok(self.by_id.lock().get(&subject_id).cloned())
        }
    }

    fn service() -> (AuthService, Arc<Users>, TokenValidator) {
        let ring = Arc::new(KeyRing::new(SigningIdentity::hmac("hs-1", HMAC_SECRET).unwrap()));
        let signer = TokenSigner::new(
            Arc::clone(&ring),
            "auth-service",
            "platform-api",
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        let rotator = RefreshTokenRotator::new(Arc::new(InMemoryLedger::new()), signer.clone());
        let users = Arc::new(Users::default());
        let subject = sample_subject();
        users.by_id.lock().insert(
            subject.subject_id,
            UserRecord {
                password_digest: PlainHasher.hash("hunter2").unwrap(),
                subject,
            },
        );

        let validator = TokenValidator::new(ring, ValidationPolicy::default());
        let service = AuthService::new(users.clone(), Arc::new(PlainHasher), signer, rotator);
        (service, users, validator)
    }

    #[tokio::test]
    async fn test_login_issues_valid_pair() {
        let (service, _, validator) = service();
        let pair = service.login("user@example.com", "hunter2").await.unwrap();

        let claims = validator.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.subject(), sample_subject());
        assert_eq!(pair.expires_in, Duration::from_secs(60));
        assert!(!format!("{pair:?}").contains(&pair.access_token));
    }

    #[tokio::test]
    async fn test_login_rejections_are_uniform() {
        let (service, _, _) = service();
        let wrong_password = service.login("user@example.com", "nope").await.unwrap_err();
        let unknown_user = service.login("ghost@example.com", "hunter2").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_refresh_then_logout() {
        let (service, _, validator) = service();
        let pair = service.login("user@example.com", "hunter2").await.unwrap();

        let next = service.refresh(pair.refresh_token.plaintext()).await.unwrap();
        assert_eq!(next.family_id, pair.family_id);
        assert!(validator.validate_access_token(&next.access_token).is_ok());

        service.logout(next.refresh_token.plaintext()).await.unwrap();
        service.logout(next.refresh_token.plaintext()).await.unwrap();
        assert!(matches!(
            service.refresh(next.refresh_token.plaintext()).await,
            Err(TokenError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_subject_revokes_family() {
        let (service, users, _) = service();
        let pair = service.login("user@example.com", "hunter2").await.unwrap();
        users.by_id.lock().clear();

        assert!(matches!(
            service.refresh(pair.refresh_token.plaintext()).await,
            Err(TokenError::Unauthorized { reason: "subject not found" })
        ));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_token_exchangeable() {
        let (service, users, _) = service();
        let pair = service.login("user@example.com", "hunter2").await.unwrap();

        users.offline.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.refresh(pair.refresh_token.plaintext()).await,
            Err(TokenError::Storage(_))
        ));

        users.offline.store(false, Ordering::SeqCst);
        let next = service.refresh(pair.refresh_token.plaintext()).await.unwrap();
        assert_eq!(next.family_id, pair.family_id);
    }
}
