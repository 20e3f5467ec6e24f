//! Access token verification against the remote key set.

use crate::config::VerifierConfig;
use crate::error::AuthEdgeError;
use crate::jwt::jwk_cache::{CachedKeySet, RemoteKeyCache};
use auth_common::{inspect_header, verify_token, AccessClaims, ValidationPolicy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Verifies access tokens with keys from a [`RemoteKeyCache`].
///
/// An unknown key ID triggers exactly one refetch before the token is
/// rejected. An optional cooldown spaces refetches triggered by misses. A
/// snapshot older than the staleness bound is refreshed before use and is
/// not trusted if that refresh fails.
pub struct RemoteTokenVerifier {
    cache: Arc<RemoteKeyCache>,
    policy: ValidationPolicy,
    max_staleness: Duration,
    refetch_cooldown: Duration,
    last_refetch: Mutex<Option<Instant>>,
}

impl RemoteTokenVerifier {
    /// Create a verifier over `cache`.
    #[must_use]
    pub fn new(cache: Arc<RemoteKeyCache>, config: &VerifierConfig) -> Self {
        Self {
            cache,
            policy: config.validation_policy(),
            max_staleness: config.max_staleness,
            refetch_cooldown: config.refetch_cooldown,
            last_refetch: Mutex::new(None),
        }
    }

    /// Key cache backing this verifier.
    #[must_use]
    pub fn cache(&self) -> &Arc<RemoteKeyCache> {
        &self.cache
    }

    /// Verify `token` now.
    ///
    /// # Errors
    ///
    /// See [`RemoteTokenVerifier::verify_at`].
    pub async fn verify(&self, token: &str) -> Result<AccessClaims, AuthEdgeError> {
        self.verify_at(token, Utc::now()).await
    }

    /// Verify `token` as of `now`.
    ///
    /// # Errors
    ///
    /// - [`AuthEdgeError::TokenExpired`] if the signature is valid but the
    ///   token is past its expiry
    /// - [`AuthEdgeError::Unauthorized`] for unknown key IDs and every other
    ///   signature, format or claim failure
    /// - [`AuthEdgeError::KeyFetch`] if a required refresh fails
    #[instrument(skip_all)]
    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, AuthEdgeError> {
        let header = inspect_header(token)?;
        // Remote key sets only carry asymmetric keys.
        if header.algorithm.is_symmetric() {
            return Err(AuthEdgeError::unauthorized("algorithm not accepted"));
        }

        let (mut snapshot, mut refreshed) = self.usable_snapshot(now).await?;

        if snapshot.key(&header.key_id).is_none() && !refreshed {
            if let Some(next) = self.refetch_for_miss(&header.key_id).await? {
                snapshot = next;
                refreshed = true;
            }
        }

        let Some(key) = snapshot.key(&header.key_id) else {
            debug!(kid = %header.key_id, refreshed, "Unknown key id");
            return Err(AuthEdgeError::unauthorized("unknown key id"));
        };

        Ok(verify_token(token, key, &self.policy, now)?)
    }

    /// Snapshot fresh enough to trust at `now`, and whether it was fetched
    /// by this call.
    async fn usable_snapshot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Arc<CachedKeySet>, bool), AuthEdgeError> {
        match self.cache.current_set() {
            Some(snapshot) if !snapshot.is_older_than(self.max_staleness, now) => {
                Ok((snapshot, false))
            }
            stale => {
                if let Some(snapshot) = &stale {
                    info!(
                        fetched_at = %snapshot.fetched_at(),
                        "JWKS snapshot exceeded max staleness; refreshing"
                    );
                }
                match self.cache.refresh().await {
                    Ok(snapshot) => Ok((snapshot, true)),
                    Err(e) => {
                        warn!(error = %e, "Required JWKS refresh failed");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Refetch once for an unknown `kid`, unless another miss refetched
    /// within the cooldown. Returns the snapshot to retry the lookup with.
    async fn refetch_for_miss(
        &self,
        kid: &str,
    ) -> Result<Option<Arc<CachedKeySet>>, AuthEdgeError> {
        {
            let mut last = self.last_refetch.lock();
            if !self.refetch_cooldown.is_zero()
                && last.is_some_and(|at| at.elapsed() < self.refetch_cooldown)
            {
                debug!(kid = %kid, "Refetch suppressed by cooldown");
                return Ok(self.cache.current_set());
            }
            *last = Some(Instant::now());
        }

        info!(kid = %kid, "Unknown key id; refetching JWKS");
        self.cache.refresh_for_key(kid).await.map(Some)
    }
}

impl std::fmt::Debug for RemoteTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTokenVerifier")
            .field("policy", &self.policy)
            .field("max_staleness", &self.max_staleness)
            .field("refetch_cooldown", &self.refetch_cooldown)
            .finish_non_exhaustive()
    }
}
