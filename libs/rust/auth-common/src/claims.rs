//! Access token claims.
//!
//! The payload of every access token is a fixed record. Decoding is total:
//! a token missing a field, or carrying a field of the wrong type, fails to
//! decode rather than falling back to a default value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity attributes a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    /// Numeric subject identifier
    pub subject_id: u64,
    /// Subject email
    pub email: String,
    /// Subject role
    pub role: String,
}

impl SubjectInfo {
    /// Create subject attributes.
    #[must_use]
    pub fn new(subject_id: u64, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            subject_id,
            email: email.into(),
            role: role.into(),
        }
    }
}

/// Claims carried by a signed access token.
///
/// Field names on the wire are `uid`, `email`, `role`, `iss`, `aud`, `iat`
/// and `exp`. All of them are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "uid")]
    subject_id: u64,
    email: String,
    role: String,
    #[serde(rename = "iss")]
    issuer: String,
    #[serde(rename = "aud")]
    audience: String,
    #[serde(rename = "iat")]
    issued_at: i64,
    #[serde(rename = "exp")]
    expires_at: i64,
}

impl AccessClaims {
    /// Build claims for `subject` issued at `issued_at` and valid for `ttl`.
    #[must_use]
    pub fn issue(
        subject: &SubjectInfo,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let iat = issued_at.timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            subject_id: subject.subject_id,
            email: subject.email.clone(),
            role: subject.role.clone(),
            issuer: issuer.into(),
            audience: audience.into(),
            issued_at: iat,
            expires_at: iat.saturating_add(ttl_secs),
        }
    }

    /// Subject identifier (`uid`).
    #[must_use]
    pub const fn subject_id(&self) -> u64 {
        self.subject_id
    }

    /// Subject email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Subject role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Issuer (`iss`).
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audience (`aud`).
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Issued-at as unix seconds.
    #[must_use]
    pub const fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry as unix seconds.
    #[must_use]
    pub const fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Expiry as a timestamp, clamped to now if out of range.
    #[must_use]
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires_at, 0).unwrap_or_else(Utc::now)
    }

    /// Subject attributes carried by these claims.
    #[must_use]
    pub fn subject(&self) -> SubjectInfo {
        SubjectInfo::new(self.subject_id, self.email.clone(), self.role.clone())
    }

    /// Whether the token is expired at `now`, allowing `leeway_secs` of skew.
    #[must_use]
    pub const fn is_expired_at(&self, now: i64, leeway_secs: i64) -> bool {
        self.expires_at.saturating_add(leeway_secs) < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AccessClaims {
        let issued_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        AccessClaims::issue(
            &SubjectInfo::new(42, "a@b.com", "user"),
            "auth-service",
            "platform-api",
            issued_at,
            Duration::from_secs(900),
        )
    }

    #[test]
    fn test_claims_creation() {
        let claims = sample();
        assert_eq!(claims.subject_id(), 42);
        assert_eq!(claims.issued_at(), 1_700_000_000);
        assert_eq!(claims.expires_at(), 1_700_000_900);
        assert_eq!(claims.subject(), SubjectInfo::new(42, "a@b.com", "user"));
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        for field in ["uid", "email", "role", "iss", "aud", "iat", "exp"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_missing_uid_fails_closed() {
        let json = r#"{"email":"a@b.com","role":"user","iss":"i","aud":"a","iat":1,"exp":2}"#;
        assert!(serde_json::from_str::<AccessClaims>(json).is_err());
    }

    #[test]
    fn test_mistyped_uid_fails_closed() {
        for uid in [r#""42""#, "-1", "4.2", "null"] {
            let json = format!(
                r#"{{"uid":{uid},"email":"a@b.com","role":"user","iss":"i","aud":"a","iat":1,"exp":2}}"#
            );
            assert!(serde_json::from_str::<AccessClaims>(&json).is_err(), "uid {uid} accepted");
        }
    }

    #[test]
    fn test_expiry_with_leeway() {
        let claims = sample();
        assert!(!claims.is_expired_at(1_700_000_900, 0));
        assert!(claims.is_expired_at(1_700_000_901, 0));
        assert!(!claims.is_expired_at(1_700_000_905, 5));
        assert!(claims.is_expired_at(1_700_000_906, 5));
    }
}
