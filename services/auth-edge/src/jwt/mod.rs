//! Remote key set cache and token verification.

pub mod jwk_cache;
pub mod verifier;

pub use jwk_cache::{CachedKeySet, HttpKeySetFetcher, KeySetFetcher, RefreshStatus, RemoteKeyCache};
pub use verifier::RemoteTokenVerifier;
