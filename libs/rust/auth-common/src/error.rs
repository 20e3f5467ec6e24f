//! Validation error classification.
//!
//! Every failure of the shared validation routine lands in one of two
//! buckets: the token was genuine but is past its expiry, or it is not
//! acceptable at all. Library errors are never passed through.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

/// Outcome of a failed access token validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Signature and claims were valid but the token is past `exp` plus leeway.
    #[error("token expired at {expired_at}")]
    Expired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Signature, structure, algorithm or claims were not acceptable.
    #[error("token invalid: {reason}")]
    Invalid {
        /// Fixed description of the rejection
        reason: &'static str,
    },
}

impl ValidationError {
    /// Create an invalid-token error.
    #[must_use]
    pub const fn invalid(reason: &'static str) -> Self {
        Self::Invalid { reason }
    }

    /// Whether this is the expired variant.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for ValidationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        let reason = match err.kind() {
            ErrorKind::InvalidSignature => "signature mismatch",
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => "algorithm mismatch",
            ErrorKind::InvalidIssuer => "issuer mismatch",
            ErrorKind::InvalidAudience => "audience mismatch",
            ErrorKind::MissingRequiredClaim(_) => "missing required claim",
            ErrorKind::Json(_) => "malformed claims",
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => "malformed token",
            ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) => "unusable verification key",
            _ => "token rejected",
        };
        Self::Invalid { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_error_classified() {
        let err: ValidationError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert_eq!(err, ValidationError::invalid("signature mismatch"));
        assert!(!err.is_expired());
    }

    #[test]
    fn test_audience_error_classified() {
        let err: ValidationError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAudience).into();
        assert_eq!(err, ValidationError::invalid("audience mismatch"));
    }
}
