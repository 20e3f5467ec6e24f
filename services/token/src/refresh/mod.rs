//! Refresh token generation, persistence interface and rotation.

pub mod generator;
pub mod ledger;
pub mod rotator;

pub use generator::RefreshTokenGenerator;
pub use ledger::{LedgerError, RefreshTokenLedger, RefreshTokenRecord};
pub use rotator::{RefreshGrant, RefreshTokenRotator};
