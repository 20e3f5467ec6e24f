//! Active signing identity plus identities retired by rotation.
//!
//! After a rotation the previous identity stays trusted, and published, until
//! its grace deadline so tokens it signed keep validating while they live out
//! their TTL and resource servers pick up the new key.

use super::identity::SigningIdentity;
use crate::error::TokenError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
struct RetiredIdentity {
    identity: Arc<SigningIdentity>,
    trusted_until: DateTime<Utc>,
}

#[derive(Debug)]
struct KeyRingState {
    active: Arc<SigningIdentity>,
    retired: Vec<RetiredIdentity>,
}

/// Issuer key ring.
#[derive(Debug)]
pub struct KeyRing {
    state: RwLock<KeyRingState>,
}

impl KeyRing {
    /// Create a ring with a single active identity.
    #[must_use]
    pub fn new(active: SigningIdentity) -> Self {
        Self {
            state: RwLock::new(KeyRingState {
                active: Arc::new(active),
                retired: Vec::new(),
            }),
        }
    }

    /// The identity new tokens are signed with.
    #[must_use]
    pub fn active(&self) -> Arc<SigningIdentity> {
        Arc::clone(&self.state.read().active)
    }

    /// Make `next` the active identity, keeping the current one trusted for `grace`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `next` reuses a key ID already on the ring.
    pub fn rotate(&self, next: SigningIdentity, grace: Duration) -> Result<(), TokenError> {
        self.rotate_at(next, grace, Utc::now())
    }

    /// [`KeyRing::rotate`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `next` reuses a key ID already on the ring.
    pub fn rotate_at(
        &self,
        next: SigningIdentity,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|_| TokenError::config("key rotation grace out of range"))?;

        let mut state = self.state.write();
        let clashes = state.active.key_id() == next.key_id()
            || state.retired.iter().any(|r| r.identity.key_id() == next.key_id());
        if clashes {
            return Err(TokenError::config(format!(
                "key ID {} is already on the key ring",
                next.key_id()
            )));
        }

        let previous = std::mem::replace(&mut state.active, Arc::new(next));
        info!(
            previous_kid = %previous.key_id(),
            active_kid = %state.active.key_id(),
            grace_secs = grace.num_seconds(),
            "Rotated signing key"
        );
        state.retired.push(RetiredIdentity {
            identity: previous,
            trusted_until: now + grace,
        });
        state.retired.retain(|r| r.trusted_until > now);
        Ok(())
    }

    /// Find a trusted identity by key ID.
    #[must_use]
    pub fn find(&self, key_id: &str, now: DateTime<Utc>) -> Option<Arc<SigningIdentity>> {
        let state = self.state.read();
        if state.active.key_id() == key_id {
            return Some(Arc::clone(&state.active));
        }
        state
            .retired
            .iter()
            .find(|r| r.trusted_until > now && r.identity.key_id() == key_id)
            .map(|r| Arc::clone(&r.identity))
    }

    /// Every trusted identity, active first.
    #[must_use]
    pub fn trusted(&self, now: DateTime<Utc>) -> Vec<Arc<SigningIdentity>> {
        let state = self.state.read();
        std::iter::once(Arc::clone(&state.active))
            .chain(
                state
                    .retired
                    .iter()
                    .filter(|r| r.trusted_until > now)
                    .map(|r| Arc::clone(&r.identity)),
            )
            .collect()
    }

    /// Drop retired identities past their grace deadline. Returns how many were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        let before = state.retired.len();
        state.retired.retain(|r| r.trusted_until > now);
        before - state.retired.len()
    }
}
