//! Rotation-on-use exchange of refresh tokens.

use crate::error::TokenError;
use crate::jwt::{IssuedRefreshToken, TokenSigner};
use crate::refresh::generator::RefreshTokenGenerator;
use crate::refresh::ledger::{LedgerError, RefreshTokenLedger, RefreshTokenRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A refresh token handed to a client together with its stored record.
#[derive(Debug)]
pub struct RefreshGrant {
    /// Token to return to the client
    pub token: IssuedRefreshToken,
    /// Ledger record of the token
    pub record: RefreshTokenRecord,
}

/// Rotation-on-use protocol over a [`RefreshTokenLedger`].
///
/// Each exchange consumes the presented token and issues a replacement in
/// the same family. Presenting a consumed token again is reported as
/// [`TokenError::RotationConflict`] carrying the family ID; the rotator does
/// not revoke the family itself, that decision belongs to the caller.
#[derive(Clone)]
pub struct RefreshTokenRotator {
    ledger: Arc<dyn RefreshTokenLedger>,
    signer: TokenSigner,
}

impl RefreshTokenRotator {
    /// Create a rotator.
    #[must_use]
    pub fn new(ledger: Arc<dyn RefreshTokenLedger>, signer: TokenSigner) -> Self {
        RefreshTokenRotator { ledger, signer }
    }

    /// Issue and store the first refresh token of a new family.
    ///
    /// # Errors
    ///
    /// Returns an error if token generation or the ledger fails.
    #[instrument(skip(self))]
    pub async fn start_session(&self, subject_id: u64) -> Result<RefreshGrant, TokenError> {
        let token = self.signer.issue_refresh_token(subject_id)?;
        let record = self
            .ledger
            .save(subject_id, token.token_hash(), token.expires_at())
            .await?;

        info!(
            family_id = %record.family_id,
            subject_id = subject_id,
            "Created new token family"
        );

        Ok(RefreshGrant { token, record })
    }

    /// Check that `refresh_token` is exchangeable now.
    ///
    /// # Errors
    ///
    /// See [`RefreshTokenRotator::validate_at`].
    pub async fn validate(&self, refresh_token: &str) -> Result<RefreshTokenRecord, TokenError> {
        self.validate_at(refresh_token, Utc::now()).await
    }

    /// Check that `refresh_token` is exchangeable at `now`.
    ///
    /// # Errors
    ///
    /// [`TokenError::Unauthorized`] if the token is unknown, revoked or
    /// expired; [`TokenError::RotationConflict`] if it was already rotated.
    pub async fn validate_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, TokenError> {
        let token_hash = RefreshTokenGenerator::hash(refresh_token);
        let record = self
            .ledger
            .find_by_hash(&token_hash)
            .await?
            .ok_or(TokenError::unauthorized("refresh token not found"))?;

        if record.is_rotated() {
            self.log_security_event(&record, "REFRESH_TOKEN_REPLAY");
            return Err(TokenError::RotationConflict {
                family_id: Some(record.family_id),
            });
        }
        if record.revoked {
            return Err(TokenError::unauthorized("refresh token revoked"));
        }
        if record.is_expired_at(now) {
            return Err(TokenError::unauthorized("refresh token expired"));
        }

        Ok(record)
    }

    /// Exchange `refresh_token` for a new token in the same family.
    ///
    /// # Errors
    ///
    /// See [`RefreshTokenRotator::rotate_at`].
    pub async fn rotate(&self, refresh_token: &str) -> Result<RefreshGrant, TokenError> {
        self.rotate_at(refresh_token, Utc::now()).await
    }

    /// Exchange `refresh_token` at `now` for a new token in the same family.
    ///
    /// # Errors
    ///
    /// [`TokenError::Unauthorized`] if the token is unknown, revoked or
    /// expired; [`TokenError::RotationConflict`] if it was already rotated,
    /// including by a concurrent exchange that won the race.
    #[instrument(skip_all)]
    pub async fn rotate_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshGrant, TokenError> {
        let current = self.validate_at(refresh_token, now).await?;
        let token = self.signer.issue_refresh_token_at(current.subject_id, now)?;

        let record = match self
            .ledger
            .rotate(&current.token_hash, token.token_hash(), token.expires_at())
            .await
        {
            Ok(record) => record,
            Err(LedgerError::Conflict) => {
                self.log_security_event(&current, "REFRESH_TOKEN_REPLAY");
                return Err(TokenError::RotationConflict {
                    family_id: Some(current.family_id),
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            family_id = %record.family_id,
            subject_id = record.subject_id,
            "Rotated refresh token"
        );

        Ok(RefreshGrant { token, record })
    }

    /// Revoke `refresh_token`. Revoking an unknown or already revoked token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger fails.
    #[instrument(skip_all)]
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool, TokenError> {
        let token_hash = RefreshTokenGenerator::hash(refresh_token);
        let changed = self.ledger.revoke(&token_hash).await?;
        if changed {
            info!("Revoked refresh token");
        }
        Ok(changed)
    }

    /// Revoke every token of a family.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger fails.
    #[instrument(skip(self))]
    pub async fn revoke_family(&self, family_id: &str) -> Result<u64, TokenError> {
        let count = self.ledger.revoke_family(family_id).await?;
        info!(family_id = %family_id, count = count, "Revoked token family");
        Ok(count)
    }

    /// Delete records expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, TokenError> {
        let count = self.ledger.purge_expired(now).await?;
        if count > 0 {
            info!(count = count, "Purged expired refresh tokens");
        }
        Ok(count)
    }

    fn log_security_event(&self, record: &RefreshTokenRecord, event_type: &str) {
        warn!(
            event_type = %event_type,
            family_id = %record.family_id,
            subject_id = record.subject_id,
            "Security event"
        );
    }
}

impl std::fmt::Debug for RefreshTokenRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenRotator")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyRing, SigningIdentity};
    use crate::storage::InMemoryLedger;
    use std::time::Duration;
    use test_utils::HMAC_SECRET;

    fn rotator() -> RefreshTokenRotator {
        let ring = Arc::new(KeyRing::new(SigningIdentity::hmac("hs-1", HMAC_SECRET).unwrap()));
        let signer = TokenSigner::new(
            ring,
            "auth-service",
            "platform-api",
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        RefreshTokenRotator::new(Arc::new(InMemoryLedger::new()), signer)
    }

    #[tokio::test]
    async fn test_rotation_chain_keeps_family() {
        let rotator = rotator();
        let first = rotator.start_session(7).await.unwrap();
        let second = rotator.rotate(first.token.plaintext()).await.unwrap();
        let third = rotator.rotate(second.token.plaintext()).await.unwrap();

        assert_eq!(first.record.family_id, third.record.family_id);
        assert_eq!(third.record.subject_id, 7);
        assert!(rotator.validate(third.token.plaintext()).await.is_ok());
    }

    #[tokio::test]
    async fn test_replay_reports_family() {
        let rotator = rotator();
        let first = rotator.start_session(7).await.unwrap();
        let second = rotator.rotate(first.token.plaintext()).await.unwrap();

        match rotator.rotate(first.token.plaintext()).await {
            Err(TokenError::RotationConflict { family_id }) => {
                assert_eq!(family_id.as_deref(), Some(first.record.family_id.as_str()));
            }
            other => panic!("expected rotation conflict, got {other:?}"),
        }
        // The replacement stays valid until the caller revokes the family.
        assert!(rotator.validate(second.token.plaintext()).await.is_ok());

        assert_eq!(rotator.revoke_family(&first.record.family_id).await.unwrap(), 2);
        assert!(matches!(
            rotator.validate(second.token.plaintext()).await,
            Err(TokenError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_unauthorized() {
        assert!(matches!(
            rotator().rotate("never-issued").await,
            Err(TokenError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_token_unauthorized() {
        let rotator = rotator();
        let grant = rotator.start_session(7).await.unwrap();
        let later = grant.record.expires_at + chrono::Duration::seconds(1);
        assert!(matches!(
            rotator.rotate_at(grant.token.plaintext(), later).await,
            Err(TokenError::Unauthorized { reason: "refresh token expired" })
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let rotator = rotator();
        let grant = rotator.start_session(7).await.unwrap();
        assert!(rotator.revoke(grant.token.plaintext()).await.unwrap());
        assert!(!rotator.revoke(grant.token.plaintext()).await.unwrap());
        assert!(!rotator.revoke("never-issued").await.unwrap());
        assert!(matches!(
            rotator.rotate(grant.token.plaintext()).await,
            Err(TokenError::Unauthorized { reason: "refresh token revoked" })
        ));
    }
}
