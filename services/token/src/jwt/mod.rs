//! Access token issuance and local validation.

pub mod signer;
pub mod validator;

pub use signer::{IssuedRefreshToken, TokenSigner};
pub use validator::TokenValidator;
