//! Signing identities and the issuer key ring.

pub mod identity;
pub mod key_ring;

pub use identity::SigningIdentity;
pub use key_ring::KeyRing;
