//! Refresh token ledger backends.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryLedger;
pub use self::redis::RedisLedger;
