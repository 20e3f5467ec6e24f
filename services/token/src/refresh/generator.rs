//! Refresh token generation and hashing.

use crate::error::TokenError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Bytes of entropy in a refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Refresh token generator.
pub struct RefreshTokenGenerator;

impl RefreshTokenGenerator {
    /// Generate a new opaque refresh token from the OS entropy source.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::RandomSource`] if the entropy source fails. The
    /// caller must not fall back to a weaker generator.
    pub fn generate() -> Result<Zeroizing<String>, TokenError> {
        let mut random_bytes = Zeroizing::new([0_u8; REFRESH_TOKEN_BYTES]);
        OsRng
            .try_fill_bytes(&mut random_bytes[..])
            .map_err(|e| TokenError::RandomSource {
                reason: e.to_string(),
            })?;
        Ok(Zeroizing::new(URL_SAFE_NO_PAD.encode(&random_bytes[..])))
    }

    /// Hash a refresh token for storage: base64url(SHA-256(token)).
    #[must_use]
    pub fn hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let result = hasher.finalize();
        URL_SAFE_NO_PAD.encode(result)
    }

    /// Generate an identifier for a new token family.
    #[must_use]
    pub fn generate_family_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_tokens() {
        let token1 = RefreshTokenGenerator::generate().unwrap();
        let token2 = RefreshTokenGenerator::generate().unwrap();
        assert_ne!(*token1, *token2);
        assert_eq!(token1.len(), 43); // 32 bytes, base64url without padding
        assert!(!token1.contains('='));
    }

    #[test]
    fn test_hash_deterministic() {
        let hash1 = RefreshTokenGenerator::hash("test-token");
        let hash2 = RefreshTokenGenerator::hash("test-token");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 43);
    }

    #[test]
    fn test_hash_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            RefreshTokenGenerator::hash("abc"),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn test_hash_different_for_different_tokens() {
        assert_ne!(RefreshTokenGenerator::hash("token1"), RefreshTokenGenerator::hash("token2"));
    }
}
