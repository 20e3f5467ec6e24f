//! Refresh token persistence interface.
//!
//! The ledger stores only hashes. Every token produced by rotation from one
//! login shares a family ID, so a whole session can be revoked at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stored state of one refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// base64url(SHA-256(plaintext))
    pub token_hash: String,
    /// Subject the token was issued to
    pub subject_id: u64,
    /// Rotation family
    pub family_id: String,
    /// When the record was written
    pub created_at: DateTime<Utc>,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
    /// Revoked by logout or family revocation
    pub revoked: bool,
    /// When the token was consumed by rotation
    pub rotated_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// Whether the token is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the token was already consumed by rotation.
    #[must_use]
    pub const fn is_rotated(&self) -> bool {
        self.rotated_at.is_some()
    }

    /// Whether the token may be exchanged at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_rotated() && !self.is_expired_at(now)
    }
}

/// Ledger operation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No record for the hash
    #[error("refresh token not found")]
    NotFound,

    /// The record was already rotated
    #[error("refresh token already rotated")]
    Conflict,

    /// The record was revoked
    #[error("refresh token revoked")]
    Inactive,

    /// Backend failure
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Persistence for refresh token hashes.
///
/// Implementations must make [`RefreshTokenLedger::rotate`] atomic: of two
/// concurrent rotations of the same hash exactly one succeeds and the other
/// fails with [`LedgerError::Conflict`].
#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    /// Store a new token, starting a new family.
    async fn save(
        &self,
        subject_id: u64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, LedgerError>;

    /// Look up a token by hash.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, LedgerError>;

    /// Revoke a token. Returns whether a live record changed state.
    async fn revoke(&self, token_hash: &str) -> Result<bool, LedgerError>;

    /// Consume `old_hash` and store `new_hash` in the same family.
    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, LedgerError>;

    /// Revoke every token of a family. Returns how many records changed state.
    async fn revoke_family(&self, family_id: &str) -> Result<u64, LedgerError>;

    /// Delete records expired at `now`. Returns how many were deleted.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixed_now;

    fn record() -> RefreshTokenRecord {
        RefreshTokenRecord {
            token_hash: "hash-1".to_string(),
            subject_id: 1,
            family_id: "family-1".to_string(),
            created_at: fixed_now(),
            expires_at: fixed_now() + chrono::Duration::seconds(60),
            revoked: false,
            rotated_at: None,
        }
    }

    #[test]
    fn test_usable_record() {
        assert!(record().is_usable_at(fixed_now()));
    }

    #[test]
    fn test_expiry_boundary() {
        let record = record();
        let at_expiry = record.expires_at;
        assert!(!record.is_expired_at(at_expiry - chrono::Duration::seconds(1)));
        assert!(record.is_expired_at(at_expiry));
        assert!(!record.is_usable_at(at_expiry));
    }

    #[test]
    fn test_revoked_and_rotated_unusable() {
        let mut revoked = record();
        revoked.revoked = true;
        assert!(!revoked.is_usable_at(fixed_now()));

        let mut rotated = record();
        rotated.rotated_at = Some(fixed_now());
        assert!(rotated.is_rotated());
        assert!(!rotated.is_usable_at(fixed_now()));
    }
}
