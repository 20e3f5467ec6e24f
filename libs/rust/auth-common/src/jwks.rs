//! Published key set (JWKS) documents.
//!
//! The issuer publishes its public verification keys as a JSON Web Key Set;
//! resource servers fetch the document and convert each entry into a
//! [`VerificationKey`]. Only RSA signature keys are ever accepted from a
//! published document: a symmetric key arriving over the network is
//! rejected outright.

use crate::algorithm::SigningAlgorithm;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum accepted RSA modulus size in bytes (2048 bits).
pub const MIN_RSA_MODULUS_BYTES: usize = 256;

/// JSON Web Key entry of a published key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKey {
    /// Key type (RSA)
    pub kty: String,
    /// Key ID
    pub kid: String,
    /// Key use (sig)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl PublishedKey {
    /// Build an RSA signature key entry from base64url components.
    #[must_use]
    pub fn rsa(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: kid.into(),
            key_use: Some("sig".to_string()),
            alg: Some(SigningAlgorithm::RS256.as_str().to_string()),
            n: Some(n.into()),
            e: Some(e.into()),
        }
    }
}

/// JSON Web Key Set document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKeySet {
    /// Keys in publication order
    pub keys: Vec<PublishedKey>,
}

impl PublishedKeySet {
    /// Create an empty key set.
    #[must_use]
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Append a key.
    pub fn add_key(&mut self, key: PublishedKey) {
        self.keys.push(key);
    }

    /// Find a key by ID.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&PublishedKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Key IDs in publication order.
    #[must_use]
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.kid.as_str()).collect()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Serialize to the JSON document body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON document body.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a key set.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Reason a published key was not converted into a verification key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwkRejection {
    /// Key type other than RSA
    #[error("unsupported key type {0}")]
    UnsupportedKeyType(String),
    /// Algorithm other than RS256
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(String),
    /// Key use other than signature
    #[error("key use {0} is not sig")]
    NotForSigning(String),
    /// Modulus or exponent missing
    #[error("missing RSA components")]
    MissingComponents,
    /// Modulus below 2048 bits or not base64url
    #[error("RSA modulus too small or malformed")]
    WeakModulus,
    /// Components rejected by the JWT library
    #[error("malformed key material")]
    Malformed,
}

/// Key able to verify token signatures for one key ID.
#[derive(Clone)]
pub struct VerificationKey {
    key_id: String,
    algorithm: SigningAlgorithm,
    decoding: DecodingKey,
}

impl VerificationKey {
    /// Create a verification key.
    #[must_use]
    pub fn new(key_id: impl Into<String>, algorithm: SigningAlgorithm, decoding: DecodingKey) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm,
            decoding,
        }
    }

    /// Key ID.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm this key verifies.
    #[must_use]
    pub const fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Decoding key for `jsonwebtoken`.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TryFrom<&PublishedKey> for VerificationKey {
    type Error = JwkRejection;

    fn try_from(jwk: &PublishedKey) -> Result<Self, Self::Error> {
        if jwk.kty != "RSA" {
            return Err(JwkRejection::UnsupportedKeyType(jwk.kty.clone()));
        }
        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(JwkRejection::NotForSigning(key_use.to_string()));
            }
        }
        // A missing alg on an RSA key is read as RS256.
        if let Some(alg) = jwk.alg.as_deref() {
            if alg != SigningAlgorithm::RS256.as_str() {
                return Err(JwkRejection::UnsupportedAlgorithm(alg.to_string()));
            }
        }

        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            return Err(JwkRejection::MissingComponents);
        };

        let modulus = URL_SAFE_NO_PAD
            .decode(n.trim_end_matches('='))
            .map_err(|_| JwkRejection::WeakModulus)?;
        let significant = modulus.iter().skip_while(|b| **b == 0).count();
        if significant < MIN_RSA_MODULUS_BYTES {
            return Err(JwkRejection::WeakModulus);
        }

        let decoding = DecodingKey::from_rsa_components(n, e).map_err(|_| JwkRejection::Malformed)?;
        Ok(Self::new(jwk.kid.clone(), SigningAlgorithm::RS256, decoding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modulus(bytes: usize) -> String {
        let mut raw = vec![0xA5_u8; bytes];
        raw[0] = 0xC3;
        URL_SAFE_NO_PAD.encode(raw)
    }

    #[test]
    fn test_document_shape() {
        let mut set = PublishedKeySet::new();
        set.add_key(PublishedKey::rsa("key-1", "bW9k", "AQAB"));

        let json: serde_json::Value = serde_json::from_str(&set.to_json().unwrap()).unwrap();
        let key = &json["keys"][0];
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["kid"], "key-1");
        assert_eq!(key["use"], "sig");
        assert_eq!(key["alg"], "RS256");
    }

    #[test]
    fn test_parse_with_unknown_fields() {
        let body = br#"{"keys":[{"kty":"RSA","kid":"k","n":"AA","e":"AQAB","x5t":"ignored"}]}"#;
        let set = PublishedKeySet::from_json(body).unwrap();
        assert_eq!(set.key_ids(), vec!["k"]);
        assert!(set.find("k").is_some());
        assert!(set.find("other").is_none());
    }

    #[test]
    fn test_rejects_symmetric_key() {
        let jwk = PublishedKey {
            kty: "oct".to_string(),
            kid: "k".to_string(),
            key_use: Some("sig".to_string()),
            alg: Some("HS256".to_string()),
            n: None,
            e: None,
        };
        assert!(matches!(
            VerificationKey::try_from(&jwk),
            Err(JwkRejection::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_algorithm_and_use() {
        let mut jwk = PublishedKey::rsa("k", modulus(256), "AQAB");
        jwk.alg = Some("PS256".to_string());
        assert!(matches!(
            VerificationKey::try_from(&jwk),
            Err(JwkRejection::UnsupportedAlgorithm(_))
        ));

        let mut jwk = PublishedKey::rsa("k", modulus(256), "AQAB");
        jwk.key_use = Some("enc".to_string());
        assert!(matches!(VerificationKey::try_from(&jwk), Err(JwkRejection::NotForSigning(_))));
    }

    #[test]
    fn test_rejects_weak_or_missing_modulus() {
        let jwk = PublishedKey::rsa("k", modulus(128), "AQAB");
        assert_eq!(VerificationKey::try_from(&jwk).unwrap_err(), JwkRejection::WeakModulus);

        let mut jwk = PublishedKey::rsa("k", modulus(256), "AQAB");
        jwk.n = None;
        assert_eq!(VerificationKey::try_from(&jwk).unwrap_err(), JwkRejection::MissingComponents);

        let jwk = PublishedKey::rsa("k", "%%%not-base64%%%", "AQAB");
        assert_eq!(VerificationKey::try_from(&jwk).unwrap_err(), JwkRejection::WeakModulus);
    }

    #[test]
    fn test_accepts_2048_bit_modulus() {
        let jwk = PublishedKey::rsa("k", modulus(256), "AQAB");
        let key = VerificationKey::try_from(&jwk).unwrap();
        assert_eq!(key.key_id(), "k");
        assert_eq!(key.algorithm(), SigningAlgorithm::RS256);
    }
}
