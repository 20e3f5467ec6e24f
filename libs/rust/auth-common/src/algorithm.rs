//! Signing algorithms accepted by the platform.

use jsonwebtoken::Algorithm;
use std::fmt;
use std::str::FromStr;

/// JWT signing algorithm.
///
/// Only two algorithms are accepted anywhere in the platform. Everything
/// else a token header may claim is rejected before key selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 (shared secret, issuer-local only)
    HS256,
    /// RSA PKCS#1 v1.5 with SHA-256
    RS256,
}

impl SigningAlgorithm {
    /// Get algorithm name for JWT header and JWKS `alg`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
        }
    }

    /// Whether the algorithm uses a shared secret.
    #[must_use]
    pub const fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256)
    }

    /// The matching `jsonwebtoken` algorithm.
    #[must_use]
    pub const fn to_jwt(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
        }
    }

    /// Map a `jsonwebtoken` algorithm, if it is one we accept.
    #[must_use]
    pub const fn from_jwt(alg: Algorithm) -> Option<Self> {
        match alg {
            Algorithm::HS256 => Some(Self::HS256),
            Algorithm::RS256 => Some(Self::RS256),
            _ => None,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported signing algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for SigningAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "RS256" => Ok(Self::RS256),
            _ => Err(UnsupportedAlgorithm(s.to_string())),
        }
    }
}
