//! Token Service library.
//!
//! Provides access token signing and validation, signing key rotation,
//! JWKS publishing, and refresh token rotation over a pluggable ledger.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod refresh;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use config::Config;
pub use error::{ErrorCode, TokenError};
pub use jwks::JwksPublisher;
pub use jwt::{IssuedRefreshToken, TokenSigner, TokenValidator};
pub use keys::{KeyRing, SigningIdentity};
pub use refresh::{RefreshGrant, RefreshTokenLedger, RefreshTokenRecord, RefreshTokenRotator};
pub use session::{AuthService, PasswordHasher, TokenPair, UserDirectory, UserRecord};
pub use storage::{InMemoryLedger, RedisLedger};
