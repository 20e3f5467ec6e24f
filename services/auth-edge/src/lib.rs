//! Auth Edge Service - access token verification for resource servers.
//!
//! This crate provides the resource-server half of the token platform:
//! a remote JWKS cache with background refresh, a verifier that trusts only
//! keys from that cache, and an explicit route access policy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod jwt;
pub mod policy;

pub use config::{ConfigError, VerifierConfig};
pub use error::{AuthEdgeError, ErrorCode};
pub use jwt::{CachedKeySet, HttpKeySetFetcher, KeySetFetcher, RefreshStatus, RemoteKeyCache, RemoteTokenVerifier};
pub use policy::{bearer_token, BearerVerifier, RouteAccess, RoutePolicy};
