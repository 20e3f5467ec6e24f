//! JWKS publishing.

pub mod publisher;

pub use publisher::{JwksPublisher, JwksResponse};
