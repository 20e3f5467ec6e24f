//! Error handling for the edge verifier.
//!
//! This module provides a unified error handling approach with:
//! - A non-exhaustive enum for forward compatibility
//! - Stable machine codes and HTTP status mapping
//! - Classification of library errors before they leave the crate

use crate::config::ConfigError;
use auth_common::ValidationError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Non-exhaustive error enum for forward compatibility.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AuthEdgeError {
    /// Token was not provided in the request
    #[error("Token missing from request")]
    TokenMissing,

    /// Token is not acceptable: signature, format, key or claims
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Fixed description of the rejection
        reason: &'static str,
    },

    /// Token is genuine but past its expiry
    #[error("Token expired at {expired_at}")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token is valid but the subject lacks the required role
    #[error("Forbidden: role {required} required")]
    Forbidden {
        /// Role the route requires
        required: String,
    },

    /// Key set could not be fetched or contained no usable keys
    #[error("Key fetch failed: {reason}")]
    KeyFetch {
        /// Description of the failure
        reason: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No bearer token
    TokenMissing,
    /// Token rejected
    Unauthorized,
    /// Token expired
    TokenExpired,
    /// Role check failed
    Forbidden,
    /// JWKS unavailable
    KeyFetch,
    /// Configuration invalid
    Config,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TokenMissing => "AUTH_TOKEN_MISSING",
            Self::Unauthorized => "AUTH_UNAUTHORIZED",
            Self::TokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::Forbidden => "AUTH_FORBIDDEN",
            Self::KeyFetch => "JWKS_FETCH_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }

    /// HTTP status a resource server should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::TokenMissing | Self::Unauthorized | Self::TokenExpired => 401,
            Self::Forbidden => 403,
            Self::KeyFetch => 503,
            Self::Config => 500,
        }
    }
}

impl AuthEdgeError {
    /// Create an unauthorized error.
    #[must_use]
    pub const fn unauthorized(reason: &'static str) -> Self {
        Self::Unauthorized { reason }
    }

    /// Create a key fetch error.
    pub fn key_fetch(reason: impl Into<String>) -> Self {
        Self::KeyFetch {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TokenMissing => ErrorCode::TokenMissing,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::TokenExpired { .. } => ErrorCode::TokenExpired,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::KeyFetch { .. } => ErrorCode::KeyFetch,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyFetch { .. })
    }
}

impl From<ValidationError> for AuthEdgeError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Expired { expired_at } => Self::TokenExpired { expired_at },
            ValidationError::Invalid { reason } => Self::Unauthorized { reason },
        }
    }
}

impl From<reqwest::Error> for AuthEdgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::key_fetch("JWKS request timed out")
        } else if err.is_connect() {
            Self::key_fetch("JWKS endpoint unreachable")
        } else if let Some(status) = err.status() {
            Self::key_fetch(format!("JWKS endpoint returned {status}"))
        } else if err.is_decode() || err.is_body() {
            Self::key_fetch("JWKS response body unreadable")
        } else {
            Self::key_fetch("JWKS request failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (AuthEdgeError::TokenMissing, "AUTH_TOKEN_MISSING", 401),
            (AuthEdgeError::unauthorized("signature mismatch"), "AUTH_UNAUTHORIZED", 401),
            (
                AuthEdgeError::TokenExpired {
                    expired_at: Utc::now(),
                },
                "AUTH_TOKEN_EXPIRED",
                401,
            ),
            (
                AuthEdgeError::Forbidden {
                    required: "admin".to_string(),
                },
                "AUTH_FORBIDDEN",
                403,
            ),
            (AuthEdgeError::key_fetch("down"), "JWKS_FETCH_ERROR", 503),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code().as_str(), code);
            assert_eq!(err.code().http_status(), status);
        }
    }

    #[test]
    fn test_only_key_fetch_is_retryable() {
        assert!(AuthEdgeError::key_fetch("down").is_retryable());
        assert!(!AuthEdgeError::unauthorized("unknown key id").is_retryable());
        assert!(!AuthEdgeError::TokenMissing.is_retryable());
    }

    #[test]
    fn test_validation_error_classification() {
        let expired_at = Utc::now();
        assert!(matches!(
            AuthEdgeError::from(ValidationError::Expired { expired_at }),
            AuthEdgeError::TokenExpired { .. }
        ));
        assert!(matches!(
            AuthEdgeError::from(ValidationError::invalid("audience mismatch")),
            AuthEdgeError::Unauthorized { reason: "audience mismatch" }
        ));
    }
}
