//! JWKS document built from the trusted asymmetric keys on the key ring.

use crate::error::TokenError;
use crate::keys::KeyRing;
use auth_common::PublishedKeySet;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Content type of the JWKS document.
pub const CONTENT_TYPE: &str = "application/json";

/// Body and headers for serving the JWKS document from any HTTP router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwksResponse {
    /// `Content-Type` header value
    pub content_type: &'static str,
    /// `Cache-Control` header value
    pub cache_control: String,
    /// JSON document
    pub body: String,
}

/// Publishes the public half of every trusted asymmetric identity.
///
/// Symmetric identities are never published. During a rotation grace period
/// both the active and the retired key appear, active first.
#[derive(Debug, Clone)]
pub struct JwksPublisher {
    keys: Arc<KeyRing>,
    max_age: Duration,
}

impl JwksPublisher {
    /// Create a publisher over `keys`.
    #[must_use]
    pub const fn new(keys: Arc<KeyRing>) -> Self {
        Self {
            keys,
            max_age: Duration::from_secs(300),
        }
    }

    /// Override the `Cache-Control` max age advertised to clients.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Current key set document.
    #[must_use]
    pub fn document(&self) -> PublishedKeySet {
        self.document_at(Utc::now())
    }

    /// Key set document as of `now`.
    #[must_use]
    pub fn document_at(&self, now: DateTime<Utc>) -> PublishedKeySet {
        let mut jwks = PublishedKeySet::new();
        for identity in self.keys.trusted(now) {
            if let Some(key) = identity.published_key() {
                jwks.add_key(key.clone());
            }
        }
        jwks
    }

    /// Current key set as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, TokenError> {
        self.document()
            .to_json()
            .map_err(|e| TokenError::Internal(format!("JWKS serialization failed: {e}")))
    }

    /// Current key set as an HTTP response.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn response(&self) -> Result<JwksResponse, TokenError> {
        Ok(JwksResponse {
            content_type: CONTENT_TYPE,
            cache_control: format!("public, max-age={}", self.max_age.as_secs()),
            body: self.to_json()?,
        })
    }
}
