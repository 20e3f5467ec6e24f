//! Signing identities.
//!
//! A signing identity pairs a key ID with the private material used to sign
//! and the public material used to verify. RSA identities also carry the
//! JWK entry published for resource servers; HMAC identities have nothing
//! publishable and stay issuer-local.

use crate::config::Config;
use crate::error::TokenError;
use auth_common::jwks::MIN_RSA_MODULUS_BYTES;
use auth_common::{PublishedKey, SigningAlgorithm, VerificationKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Minimum HMAC secret length in bytes.
pub const MIN_HMAC_SECRET_BYTES: usize = 32;

/// Key material able to sign access tokens.
pub struct SigningIdentity {
    key_id: String,
    algorithm: SigningAlgorithm,
    encoding: EncodingKey,
    verification: VerificationKey,
    published: Option<PublishedKey>,
}

impl SigningIdentity {
    /// Create an HS256 identity from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is shorter than 32 bytes.
    pub fn hmac(key_id: impl Into<String>, secret: &[u8]) -> Result<Self, TokenError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(TokenError::config("key ID must not be empty"));
        }
        if secret.len() < MIN_HMAC_SECRET_BYTES {
            return Err(TokenError::config(format!(
                "HMAC secret must be at least {MIN_HMAC_SECRET_BYTES} bytes, got {}",
                secret.len()
            )));
        }

        Ok(Self {
            verification: VerificationKey::new(
                key_id.clone(),
                SigningAlgorithm::HS256,
                DecodingKey::from_secret(secret),
            ),
            key_id,
            algorithm: SigningAlgorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            published: None,
        })
    }

    /// Create an RS256 identity from a PEM private key.
    ///
    /// Both PKCS#8 (`BEGIN PRIVATE KEY`) and PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    /// encodings are accepted.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the PEM is not an RSA private key or
    /// the modulus is shorter than 2048 bits.
    pub fn rsa_from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, TokenError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(TokenError::config("key ID must not be empty"));
        }

        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| TokenError::config("private key is not a PKCS#8 or PKCS#1 RSA PEM"))?;
        if private.size() < MIN_RSA_MODULUS_BYTES {
            return Err(TokenError::config(format!(
                "RSA key must be at least 2048 bits, got {}",
                private.size() * 8
            )));
        }

        let n = URL_SAFE_NO_PAD.encode(private.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(private.e().to_bytes_be());
        drop(private);

        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| TokenError::config(format!("unusable RSA private key: {e}")))?;
        let published = PublishedKey::rsa(key_id.clone(), n, e);
        let verification = VerificationKey::try_from(&published)
            .map_err(|e| TokenError::config(format!("unusable RSA public key: {e}")))?;

        Ok(Self {
            key_id,
            algorithm: SigningAlgorithm::RS256,
            encoding,
            verification,
            published: Some(published),
        })
    }

    /// Create an RS256 identity from a PEM file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn rsa_from_pem_file(key_id: impl Into<String>, path: &Path) -> Result<Self, TokenError> {
        let pem = std::fs::read_to_string(path)
            .map(Zeroizing::new)
            .map_err(|e| TokenError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::rsa_from_pem(key_id, &pem)
    }

    /// Create the identity described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key material is missing or unusable.
    pub fn from_config(config: &Config) -> Result<Self, TokenError> {
        match config.algorithm {
            SigningAlgorithm::HS256 => {
                let secret = config.decoded_hmac_secret()?;
                Self::hmac(config.key_id.clone(), &secret)
            }
            SigningAlgorithm::RS256 => {
                let path = config
                    .private_key_path
                    .as_deref()
                    .ok_or_else(|| TokenError::config("JWT_PRIVATE_KEY_PATH is not set"))?;
                Self::rsa_from_pem_file(config.key_id.clone(), path)
            }
        }
    }

    /// Key ID written into token headers.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signing algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Key used to sign tokens.
    #[must_use]
    pub(crate) const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    /// Key used to verify tokens signed by this identity.
    #[must_use]
    pub const fn verification_key(&self) -> &VerificationKey {
        &self.verification
    }

    /// Publishable JWK, if the identity is asymmetric.
    #[must_use]
    pub const fn published_key(&self) -> Option<&PublishedKey> {
        self.published.as_ref()
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
