//! Type-Safe Configuration with Validation
//!
//! Provides verifier configuration with URL validation and environment
//! variable support.

use auth_common::{http::DEFAULT_FETCH_TIMEOUT, ValidationPolicy, DEFAULT_LEEWAY};
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Variable name
        field: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// Duration that must be positive is zero
    #[error("Invalid duration: {field} must be greater than 0")]
    ZeroDuration {
        /// Variable name
        field: String,
    },

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Remote verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// JWKS endpoint URL
    pub jwks_url: Url,
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim
    pub audience: String,
    /// Background refresh interval
    pub refresh_interval: Duration,
    /// Upper bound for one JWKS fetch
    pub fetch_timeout: Duration,
    /// Clock-skew leeway on `exp`
    pub leeway: Duration,
    /// Age after which a snapshot is refreshed before use
    pub max_staleness: Duration,
    /// Minimum spacing of refetches triggered by an unknown key id; zero disables
    pub refetch_cooldown: Duration,
}

impl VerifierConfig {
    /// Create a configuration with defaults for everything but the endpoint
    /// and expected claims.
    #[must_use]
    pub fn new(jwks_url: Url, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            jwks_url,
            issuer: issuer.into(),
            audience: audience.into(),
            refresh_interval: Duration::from_secs(300),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            leeway: DEFAULT_LEEWAY,
            max_staleness: Duration::from_secs(3600),
            refetch_cooldown: Duration::ZERO,
        }
    }

    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("JWKS_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("JWKS_URL".to_string()))?;
        let jwks_url = parse_url(&raw_url, "JWKS_URL")?;

        let config = Self {
            jwks_url,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "auth-service".to_string()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "platform-api".to_string()),
            refresh_interval: parse_secs(&lookup, "JWKS_REFRESH_INTERVAL", 300)?,
            fetch_timeout: parse_secs(&lookup, "JWKS_FETCH_TIMEOUT", DEFAULT_FETCH_TIMEOUT.as_secs())?,
            leeway: parse_secs(&lookup, "JWT_LEEWAY", DEFAULT_LEEWAY.as_secs())?,
            max_staleness: parse_secs(&lookup, "JWKS_MAX_STALENESS", 3600)?,
            refetch_cooldown: parse_secs(&lookup, "JWKS_REFETCH_COOLDOWN", 0)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.jwks_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                field: "JWKS_URL".to_string(),
                reason: format!("unsupported scheme {}", self.jwks_url.scheme()),
            });
        }
        if self.issuer.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_ISSUER".to_string()));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_AUDIENCE".to_string()));
        }
        for (field, value) in [
            ("JWKS_REFRESH_INTERVAL", self.refresh_interval),
            ("JWKS_FETCH_TIMEOUT", self.fetch_timeout),
            ("JWKS_MAX_STALENESS", self.max_staleness),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration {
                    field: field.to_string(),
                });
            }
        }
        if self.max_staleness < self.refresh_interval {
            return Err(ConfigError::ParseError {
                name: "JWKS_MAX_STALENESS".to_string(),
                reason: "must not be shorter than JWKS_REFRESH_INTERVAL".to_string(),
            });
        }
        Ok(())
    }

    /// Claim checks applied to every verified token.
    #[must_use]
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy::default()
            .with_issuer(self.issuer.clone())
            .with_audience(self.audience.clone())
            .with_leeway(self.leeway)
    }

    /// Set the background refresh interval.
    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the fetch timeout.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the validation leeway.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Set the maximum snapshot age.
    #[must_use]
    pub const fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness;
        self
    }

    /// Set the on-demand refetch cooldown.
    #[must_use]
    pub const fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.refetch_cooldown = cooldown;
        self
    }
}

/// Parse a whole-seconds variable with a default value.
fn parse_secs<F>(lookup: &F, name: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(Duration::from_secs(default)),
    }
}

fn parse_url(raw: &str, field: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        field: field.to_string(),
        reason: e.to_string(),
    })
}
