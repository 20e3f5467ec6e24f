//! Shared token primitives for auth-platform Rust services.
//!
//! This crate provides the pieces both sides of a bearer-token deployment
//! agree on:
//! - Access token claims and their typed, total decode
//! - Published key set (JWKS) documents and key conversion
//! - The signature/claims validation routine used by local and remote verifiers
//! - HTTP client configuration for key-set fetches

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod claims;
pub mod error;
pub mod http;
pub mod jwks;
pub mod validation;

pub use algorithm::SigningAlgorithm;
pub use claims::{AccessClaims, SubjectInfo};
pub use error::ValidationError;
pub use http::{build_http_client, HttpConfig};
pub use jwks::{JwkRejection, PublishedKey, PublishedKeySet, VerificationKey};
pub use validation::{inspect_header, verify_token, TokenHeader, ValidationPolicy, DEFAULT_LEEWAY};
