//! Redis-backed refresh token ledger.
//!
//! Layout:
//! - `refresh:{hash}`: hash with `subject_id`, `family_id`, `created_at`,
//!   `expires_at`, `revoked` and `rotated_at`, expiring at `expires_at`
//! - `refresh_family:{family_id}`: set of token hashes in the family
//! - `refresh_expiry`: sorted set of token hashes scored by `expires_at`
//!
//! Numeric fields are stored as decimal strings so 64-bit subject IDs
//! survive Lua untouched. State transitions run as Lua scripts, which makes
//! rotation atomic. Scripts derive record keys from prefixes, so the ledger
//! targets a single Redis node rather than a cluster.

use crate::refresh::generator::RefreshTokenGenerator;
use crate::refresh::ledger::{LedgerError, RefreshTokenLedger, RefreshTokenRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use tracing::debug;

const RECORD_PREFIX: &str = "refresh:";
const FAMILY_PREFIX: &str = "refresh_family:";
const EXPIRY_INDEX: &str = "refresh_expiry";

const ROTATE_SCRIPT: &str = r"
local fields = redis.call('HMGET', KEYS[1], 'subject_id', 'family_id', 'revoked', 'rotated_at')
if not fields[2] then
  return {'not_found'}
end
if fields[2] ~= ARGV[4] then
  return {'not_found'}
end
if fields[4] and fields[4] ~= '' then
  return {'conflict'}
end
if fields[3] == '1' then
  return {'revoked'}
end
if redis.call('EXISTS', KEYS[2]) == 1 then
  return {'duplicate'}
end
redis.call('HSET', KEYS[1], 'rotated_at', ARGV[1])
redis.call('HSET', KEYS[2],
  'subject_id', fields[1], 'family_id', fields[2], 'created_at', ARGV[1],
  'expires_at', ARGV[2], 'revoked', '0', 'rotated_at', '')
redis.call('EXPIREAT', KEYS[2], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[3])
redis.call('EXPIREAT', KEYS[3], ARGV[2])
redis.call('ZADD', KEYS[4], ARGV[2], ARGV[3])
return {'ok', fields[1]}
";

const REVOKE_SCRIPT: &str = r"
local revoked = redis.call('HGET', KEYS[1], 'revoked')
if not revoked or revoked == '1' then
  return 0
end
redis.call('HSET', KEYS[1], 'revoked', '1')
return 1
";

const REVOKE_FAMILY_SCRIPT: &str = r"
local count = 0
for _, hash in ipairs(redis.call('SMEMBERS', KEYS[1])) do
  local key = ARGV[1] .. hash
  local revoked = redis.call('HGET', key, 'revoked')
  if revoked and revoked ~= '1' then
    redis.call('HSET', key, 'revoked', '1')
    count = count + 1
  end
end
return count
";

const PURGE_SCRIPT: &str = r"
local removed = 0
for _, hash in ipairs(redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])) do
  local key = ARGV[2] .. hash
  local family = redis.call('HGET', key, 'family_id')
  if family then
    redis.call('SREM', ARGV[3] .. family, hash)
  end
  removed = removed + redis.call('DEL', key)
end
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
return removed
";

impl From<redis::RedisError> for LedgerError {
    fn from(err: redis::RedisError) -> Self {
        LedgerError::Backend(err.to_string())
    }
}

/// Refresh token ledger stored in Redis.
#[derive(Clone)]
pub struct RedisLedger {
    conn: ConnectionManager,
    rotate: Script,
    revoke: Script,
    revoke_family: Script,
    purge: Script,
}

impl RedisLedger {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, LedgerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn))
    }

    /// Use an existing connection manager.
    #[must_use]
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            rotate: Script::new(ROTATE_SCRIPT),
            revoke: Script::new(REVOKE_SCRIPT),
            revoke_family: Script::new(REVOKE_FAMILY_SCRIPT),
            purge: Script::new(PURGE_SCRIPT),
        }
    }

    fn record_key(token_hash: &str) -> String {
        format!("{RECORD_PREFIX}{token_hash}")
    }

    fn family_key(family_id: &str) -> String {
        format!("{FAMILY_PREFIX}{family_id}")
    }

    async fn family_of(&self, token_hash: &str) -> Result<Option<String>, LedgerError> {
        let mut conn = self.conn.clone();
        let family: Option<String> = redis::cmd("HGET")
            .arg(Self::record_key(token_hash))
            .arg("family_id")
            .query_async(&mut conn)
            .await?;
        Ok(family)
    }
}

impl std::fmt::Debug for RedisLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLedger").finish_non_exhaustive()
    }
}

/// Records are stored with second precision.
fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

fn parse_timestamp(fields: &HashMap<String, String>, name: &str) -> Result<DateTime<Utc>, LedgerError> {
    fields
        .get(name)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| LedgerError::Backend(format!("malformed {name} in refresh record")))
}

/// Rebuild a record from its Redis hash fields.
fn record_from_fields(
    token_hash: &str,
    fields: &HashMap<String, String>,
) -> Result<RefreshTokenRecord, LedgerError> {
    let subject_id = fields
        .get("subject_id")
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| LedgerError::Backend("malformed subject_id in refresh record".to_string()))?;
    let family_id = fields
        .get("family_id")
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| LedgerError::Backend("missing family_id in refresh record".to_string()))?;
    let rotated_at = match fields.get("rotated_at").map(String::as_str) {
        None | Some("") => None,
        Some(_) => Some(parse_timestamp(fields, "rotated_at")?),
    };

    Ok(RefreshTokenRecord {
        token_hash: token_hash.to_string(),
        subject_id,
        family_id,
        created_at: parse_timestamp(fields, "created_at")?,
        expires_at: parse_timestamp(fields, "expires_at")?,
        revoked: fields.get("revoked").is_some_and(|v| v == "1"),
        rotated_at,
    })
}

#[async_trait]
impl RefreshTokenLedger for RedisLedger {
    async fn save(
        &self,
        subject_id: u64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, LedgerError> {
        let record = RefreshTokenRecord {
            token_hash: token_hash.to_string(),
            subject_id,
            family_id: RefreshTokenGenerator::generate_family_id(),
            created_at: whole_seconds(Utc::now()),
            expires_at: whole_seconds(expires_at),
            revoked: false,
            rotated_at: None,
        };

        let key = Self::record_key(token_hash);
        let family_key = Self::family_key(&record.family_id);
        let expires = expires_at.timestamp();
        let fields = [
            ("subject_id", subject_id.to_string()),
            ("family_id", record.family_id.clone()),
            ("created_at", record.created_at.timestamp().to_string()),
            ("expires_at", expires.to_string()),
            ("revoked", "0".to_string()),
            ("rotated_at", String::new()),
        ];

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire_at(&key, expires)
            .ignore()
            .sadd(&family_key, token_hash)
            .ignore()
            .expire_at(&family_key, expires)
            .ignore()
            .zadd(EXPIRY_INDEX, token_hash, expires)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(family_id = %record.family_id, "Stored refresh token");
        Ok(record)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, LedgerError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::record_key(token_hash))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(token_hash, &fields).map(Some)
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, LedgerError> {
        let mut conn = self.conn.clone();
        let changed: i64 = self
            .revoke
            .key(Self::record_key(token_hash))
            .invoke_async(&mut conn)
            .await?;
        Ok(changed == 1)
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, LedgerError> {
        // The family of a record never changes, so reading it before the
        // script lets the script declare every key it touches.
        let family_id = self.family_of(old_hash).await?.ok_or(LedgerError::NotFound)?;
        let now = Utc::now();

        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .rotate
            .key(Self::record_key(old_hash))
            .key(Self::record_key(new_hash))
            .key(Self::family_key(&family_id))
            .key(EXPIRY_INDEX)
            .arg(now.timestamp())
            .arg(new_expires_at.timestamp())
            .arg(new_hash)
            .arg(&family_id)
            .invoke_async(&mut conn)
            .await?;

        match reply.first().map(String::as_str) {
            Some("ok") => {
                let subject_id = reply
                    .get(1)
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or_else(|| LedgerError::Backend("malformed rotate reply".to_string()))?;
                Ok(RefreshTokenRecord {
                    token_hash: new_hash.to_string(),
                    subject_id,
                    family_id,
                    created_at: whole_seconds(now),
                    expires_at: whole_seconds(new_expires_at),
                    revoked: false,
                    rotated_at: None,
                })
            }
            Some("not_found") => Err(LedgerError::NotFound),
            Some("conflict") => Err(LedgerError::Conflict),
            Some("revoked") => Err(LedgerError::Inactive),
            Some("duplicate") => Err(LedgerError::Backend("duplicate token hash".to_string())),
            _ => Err(LedgerError::Backend("unexpected rotate reply".to_string())),
        }
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, LedgerError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .revoke_family
            .key(Self::family_key(family_id))
            .arg(RECORD_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .purge
            .key(EXPIRY_INDEX)
            .arg(now.timestamp())
            .arg(RECORD_PREFIX)
            .arg(FAMILY_PREFIX)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_record_from_fields() {
        let record = record_from_fields(
            "h1",
            &fields(&[
                ("subject_id", "18446744073709551615"),
                ("family_id", "f1"),
                ("created_at", "1700000000"),
                ("expires_at", "1700003600"),
                ("revoked", "0"),
                ("rotated_at", ""),
            ]),
        )
        .unwrap();

        assert_eq!(record.subject_id, u64::MAX);
        assert_eq!(record.family_id, "f1");
        assert_eq!(record.expires_at.timestamp(), 1_700_003_600);
        assert!(!record.revoked);
        assert!(record.rotated_at.is_none());
    }

    #[test]
    fn test_rotated_and_revoked_fields() {
        let record = record_from_fields(
            "h1",
            &fields(&[
                ("subject_id", "7"),
                ("family_id", "f1"),
                ("created_at", "1700000000"),
                ("expires_at", "1700003600"),
                ("revoked", "1"),
                ("rotated_at", "1700000100"),
            ]),
        )
        .unwrap();

        assert!(record.revoked);
        assert_eq!(record.rotated_at.map(|t| t.timestamp()), Some(1_700_000_100));
    }

    #[test]
    fn test_malformed_record_is_backend_error() {
        let err = record_from_fields("h1", &fields(&[("subject_id", "-1"), ("family_id", "f1")])).unwrap_err();
        assert!(matches!(err, LedgerError::Backend(_)));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(RedisLedger::record_key("abc"), "refresh:abc");
        assert_eq!(RedisLedger::family_key("f1"), "refresh_family:f1");
    }
}
