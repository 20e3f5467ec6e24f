//! Token service errors.
//!
//! Every failure surfaced by the issuer falls into one variant below.
//! Library errors (`jsonwebtoken`, `rsa`, `redis`) are classified at the
//! point they occur and never passed through unmapped.

use crate::refresh::LedgerError;
use auth_common::ValidationError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Token service error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TokenError {
    /// The active signing key could not produce a signature
    #[error("Signing failed: {reason}")]
    Signing {
        /// Description of the failure
        reason: String,
    },

    /// The operating system entropy source failed
    #[error("Random source failure: {reason}")]
    RandomSource {
        /// Description of the failure
        reason: String,
    },

    /// Signature valid but the token is past its expiry
    #[error("Token expired at {expired_at}")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Signature, structure, algorithm or claims rejected
    #[error("Token invalid: {reason}")]
    TokenInvalid {
        /// Fixed description of the rejection
        reason: &'static str,
    },

    /// Credentials not accepted
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Fixed description of the rejection
        reason: &'static str,
    },

    /// A refresh token that was already rotated was presented again
    #[error("Refresh token already rotated")]
    RotationConflict {
        /// Family the replayed token belongs to, if known
        family_id: Option<String>,
    },

    /// Ledger backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration or key material
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Signing failure
    SigningError,
    /// Entropy failure
    RandomSourceError,
    /// Expired access token
    TokenExpired,
    /// Invalid access token
    TokenInvalid,
    /// Credentials rejected
    Unauthorized,
    /// Refresh token replay
    RotationConflict,
    /// Storage failure
    StorageError,
    /// Configuration failure
    ConfigError,
    /// Internal failure
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SigningError => "TOKEN_SIGNING_ERROR",
            Self::RandomSourceError => "TOKEN_RANDOM_SOURCE_ERROR",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::Unauthorized => "TOKEN_UNAUTHORIZED",
            Self::RotationConflict => "TOKEN_REFRESH_REUSED",
            Self::StorageError => "TOKEN_STORAGE_ERROR",
            Self::ConfigError => "TOKEN_CONFIG_ERROR",
            Self::Internal => "TOKEN_INTERNAL_ERROR",
        }
    }
}

impl TokenError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a signing error.
    pub fn signing(reason: impl Into<String>) -> Self {
        Self::Signing {
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error.
    #[must_use]
    pub const fn unauthorized(reason: &'static str) -> Self {
        Self::Unauthorized { reason }
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Signing { .. } => ErrorCode::SigningError,
            Self::RandomSource { .. } => ErrorCode::RandomSourceError,
            Self::TokenExpired { .. } => ErrorCode::TokenExpired,
            Self::TokenInvalid { .. } => ErrorCode::TokenInvalid,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::RotationConflict { .. } => ErrorCode::RotationConflict,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the error indicates a broken deployment rather than a bad request.
    /// Fatal errors are never retried.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Signing { .. } | Self::RandomSource { .. } | Self::Config(_)
        )
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<ValidationError> for TokenError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Expired { expired_at } => Self::TokenExpired { expired_at },
            ValidationError::Invalid { reason } => Self::TokenInvalid { reason },
        }
    }
}

impl From<LedgerError> for TokenError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound => Self::unauthorized("refresh token not found"),
            LedgerError::Conflict => Self::RotationConflict { family_id: None },
            LedgerError::Inactive => Self::unauthorized("refresh token revoked"),
            LedgerError::Backend(msg) => Self::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TokenError::signing("x").code().as_str(), "TOKEN_SIGNING_ERROR");
        assert_eq!(
            TokenError::RotationConflict { family_id: None }.code().as_str(),
            "TOKEN_REFRESH_REUSED"
        );
        assert_eq!(TokenError::unauthorized("x").code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TokenError::signing("bad key").is_fatal());
        assert!(TokenError::RandomSource { reason: "x".into() }.is_fatal());
        assert!(!TokenError::unauthorized("x").is_fatal());
        assert!(!TokenError::Storage("down".into()).is_fatal());
        assert!(TokenError::Storage("down".into()).is_retryable());
    }

    #[test]
    fn test_validation_error_mapping() {
        let expired_at = Utc::now();
        assert!(matches!(
            TokenError::from(ValidationError::Expired { expired_at }),
            TokenError::TokenExpired { .. }
        ));
        assert!(matches!(
            TokenError::from(ValidationError::invalid("signature mismatch")),
            TokenError::TokenInvalid { reason: "signature mismatch" }
        ));
    }

    #[test]
    fn test_ledger_error_mapping() {
        assert!(matches!(TokenError::from(LedgerError::NotFound), TokenError::Unauthorized { .. }));
        assert!(matches!(
            TokenError::from(LedgerError::Conflict),
            TokenError::RotationConflict { family_id: None }
        ));
        assert!(TokenError::from(LedgerError::Backend("io".into())).is_retryable());
    }
}
