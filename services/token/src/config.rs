//! Centralized configuration for Token Service.
//!
//! All configuration is loaded from environment variables and validated
//! at startup.

use crate::error::TokenError;
use auth_common::{SigningAlgorithm, DEFAULT_LEEWAY};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

/// Token Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // JWT settings
    /// `iss` claim written into every token
    pub issuer: String,
    /// `aud` claim written into every token
    pub audience: String,
    /// Key ID of the active signing key
    pub key_id: String,
    /// Signing algorithm of the active key
    pub algorithm: SigningAlgorithm,
    /// PEM private key path (RS256)
    pub private_key_path: Option<PathBuf>,
    /// Base64 shared secret (HS256)
    pub hmac_secret: Option<SecretString>,
    /// Access token TTL
    pub access_token_ttl: Duration,
    /// Refresh token TTL
    pub refresh_token_ttl: Duration,
    /// Clock-skew leeway for validation
    pub leeway: Duration,
    /// How long a rotated-out key stays trusted and published
    pub key_rotation_grace: Duration,

    // Storage
    /// Redis URL for the refresh token ledger; in-memory when unset
    pub redis_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TokenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let issuer = lookup("JWT_ISSUER").unwrap_or_else(|| "auth-service".to_string());
        let audience = lookup("JWT_AUDIENCE").unwrap_or_else(|| "platform-api".to_string());
        let key_id = lookup("JWT_KEY_ID").unwrap_or_else(|| "primary".to_string());
        let algorithm = lookup("JWT_ALGORITHM")
            .unwrap_or_else(|| "RS256".to_string())
            .parse::<SigningAlgorithm>()
            .map_err(|e| TokenError::config(e.to_string()))?;

        let private_key_path = lookup("JWT_PRIVATE_KEY_PATH").map(PathBuf::from);
        let hmac_secret = lookup("JWT_HMAC_SECRET").map(SecretString::from);

        let access_token_ttl = Duration::from_secs(parse_env(&lookup, "ACCESS_TOKEN_TTL", 900)?);
        let refresh_token_ttl = Duration::from_secs(parse_env(&lookup, "REFRESH_TOKEN_TTL", 604_800)?);
        let leeway = Duration::from_secs(parse_env(&lookup, "JWT_LEEWAY", DEFAULT_LEEWAY.as_secs())?);
        let key_rotation_grace = Duration::from_secs(parse_env(&lookup, "KEY_ROTATION_GRACE", 86_400)?);

        let redis_url = lookup("REFRESH_LEDGER_REDIS_URL").filter(|url| !url.is_empty());

        let config = Self {
            issuer,
            audience,
            key_id,
            algorithm,
            private_key_path,
            hmac_secret,
            access_token_ttl,
            refresh_token_ttl,
            leeway,
            key_rotation_grace,
            redis_url,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.issuer.is_empty() {
            return Err(TokenError::config("JWT_ISSUER must not be empty"));
        }
        if self.audience.is_empty() {
            return Err(TokenError::config("JWT_AUDIENCE must not be empty"));
        }
        if self.key_id.is_empty() {
            return Err(TokenError::config("JWT_KEY_ID must not be empty"));
        }
        if self.access_token_ttl.is_zero() {
            return Err(TokenError::config("ACCESS_TOKEN_TTL must be positive"));
        }
        if self.refresh_token_ttl <= self.access_token_ttl {
            return Err(TokenError::config(
                "REFRESH_TOKEN_TTL must be longer than ACCESS_TOKEN_TTL",
            ));
        }
        match self.algorithm {
            SigningAlgorithm::RS256 if self.private_key_path.is_none() => Err(TokenError::config(
                "JWT_PRIVATE_KEY_PATH is required for RS256",
            )),
            SigningAlgorithm::HS256 if self.hmac_secret.is_none() => {
                Err(TokenError::config("JWT_HMAC_SECRET is required for HS256"))
            }
            _ => Ok(()),
        }
    }

    /// Decode the configured HMAC secret.
    ///
    /// # Errors
    ///
    /// Returns an error if no secret is configured or it is not base64.
    pub fn decoded_hmac_secret(&self) -> Result<Zeroizing<Vec<u8>>, TokenError> {
        let secret = self
            .hmac_secret
            .as_ref()
            .ok_or_else(|| TokenError::config("JWT_HMAC_SECRET is not set"))?;
        STANDARD
            .decode(secret.expose_secret().trim())
            .map(Zeroizing::new)
            .map_err(|e| TokenError::config(format!("Invalid JWT_HMAC_SECRET: {e}")))
    }

    /// Set the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Set both token lifetimes.
    #[must_use]
    pub const fn with_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_ttl = access;
        self.refresh_token_ttl = refresh;
        self
    }

    /// Set the validation leeway.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

/// Parse a variable with a default value.
fn parse_env<F, T>(lookup: &F, name: &str, default: T) -> Result<T, TokenError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|e| TokenError::config(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_key_path() {
        let config = Config::from_lookup(lookup_from(&[("JWT_PRIVATE_KEY_PATH", "/keys/jwt.pem")])).unwrap();

        assert_eq!(config.issuer, "auth-service");
        assert_eq!(config.audience, "platform-api");
        assert_eq!(config.algorithm, SigningAlgorithm::RS256);
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(604_800));
        assert_eq!(config.leeway, Duration::from_secs(5));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_rs256_requires_key_path() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, TokenError::Config(_)));
    }

    #[test]
    fn test_hs256_secret_decoding() {
        let encoded = STANDARD.encode([7_u8; 32]);
        let config = Config::from_lookup(lookup_from(&[
            ("JWT_ALGORITHM", "hs256"),
            ("JWT_HMAC_SECRET", &encoded),
        ]))
        .unwrap();

        assert_eq!(config.algorithm, SigningAlgorithm::HS256);
        assert_eq!(config.decoded_hmac_secret().unwrap().as_slice(), &[7_u8; 32]);
        // The secret never appears in debug output.
        assert!(!format!("{config:?}").contains(&encoded));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("JWT_ALGORITHM", "ES256")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[
            ("JWT_PRIVATE_KEY_PATH", "/k.pem"),
            ("ACCESS_TOKEN_TTL", "abc"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup_from(&[
            ("JWT_PRIVATE_KEY_PATH", "/k.pem"),
            ("ACCESS_TOKEN_TTL", "900"),
            ("REFRESH_TOKEN_TTL", "900"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup_from(&[
            ("JWT_PRIVATE_KEY_PATH", "/k.pem"),
            ("JWT_ISSUER", ""),
        ]))
        .is_err());
    }
}
