//! In-process refresh token ledger.
//!
//! Suitable for single-instance deployments and tests. All operations take
//! one mutex, which also makes rotation atomic.

use crate::refresh::generator::RefreshTokenGenerator;
use crate::refresh::ledger::{LedgerError, RefreshTokenLedger, RefreshTokenRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Refresh token ledger held in memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RefreshTokenLedger for InMemoryLedger {
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
            created_at: Utc::now(),
            expires_at,
            revoked: false,
            rotated_at: None,
        };

        let mut records = self.records.lock();
        if records.contains_key(token_hash) {
            return Err(LedgerError::Backend("duplicate token hash".to_string()));
        }
        records.insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, LedgerError> {
        Ok(self.records.lock().get(token_hash).cloned())
    }

    async fn revoke(&self, token_hash: &str) -> Result<bool, LedgerError> {
        let mut records = self.records.lock();
        match records.get_mut(token_hash) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, LedgerError> {
        let mut records = self.records.lock();
        if records.contains_key(new_hash) {
            return Err(LedgerError::Backend("duplicate token hash".to_string()));
        }

        let old = records.get_mut(old_hash).ok_or(LedgerError::NotFound)?;
        if old.is_rotated() {
            return Err(LedgerError::Conflict);
        }
        if old.revoked {
            return Err(LedgerError::Inactive);
        }

        let now = Utc::now();
        old.rotated_at = Some(now);
        let record = RefreshTokenRecord {
            token_hash: new_hash.to_string(),
            subject_id: old.subject_id,
            family_id: old.family_id.clone(),
            created_at: now,
            expires_at: new_expires_at,
            revoked: false,
            rotated_at: None,
        };
        records.insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, LedgerError> {
        let mut records = self.records.lock();
        let mut count = 0;
        for record in records.values_mut() {
            if record.family_id == family_id && !record.revoked {
                record.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }
}
