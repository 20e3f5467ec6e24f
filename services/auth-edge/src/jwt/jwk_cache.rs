//! Remote JWKS cache with single-flight refresh.
//!
//! Implements a key cache that:
//! - Serves lock-free snapshot reads through `ArcSwap`
//! - Refreshes from one background task on a fixed interval
//! - Coalesces concurrent refreshes into a single fetch
//! - Keeps the previous snapshot when a refresh fails

use crate::config::VerifierConfig;
use crate::error::AuthEdgeError;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use auth_common::{build_http_client, HttpConfig, PublishedKeySet, VerificationKey};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Source of key set documents.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch the current key set document.
    async fn fetch(&self) -> Result<PublishedKeySet, AuthEdgeError>;
}

/// Fetches the key set from an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, AuthEdgeError> {
        let client = build_http_client(&HttpConfig::default().with_timeout(timeout))
            .map_err(|e| AuthEdgeError::key_fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<PublishedKeySet, AuthEdgeError> {
        debug!(url = %self.url, "Fetching JWKS");
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(AuthEdgeError::key_fetch(format!(
                "JWKS fetch failed with status: {}",
                response.status()
            )));
        }
        let body = response.bytes().await?;
        PublishedKeySet::from_json(&body)
            .map_err(|e| AuthEdgeError::key_fetch(format!("Failed to parse JWKS: {e}")))
    }
}

/// Immutable key set snapshot.
pub struct CachedKeySet {
    key_set: PublishedKeySet,
    keys: HashMap<String, VerificationKey>,
    fetched_at: DateTime<Utc>,
    generation: u64,
}

impl CachedKeySet {
    /// Convert a fetched document into a snapshot.
    ///
    /// Keys that cannot verify RS256 signatures are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AuthEdgeError::KeyFetch`] if no key is usable.
    pub fn build(
        key_set: PublishedKeySet,
        fetched_at: DateTime<Utc>,
        generation: u64,
    ) -> Result<Self, AuthEdgeError> {
        let mut keys = HashMap::new();
        for jwk in &key_set.keys {
            match VerificationKey::try_from(jwk) {
                Ok(key) => {
                    keys.insert(jwk.kid.clone(), key);
                }
                Err(reason) => warn!(kid = %jwk.kid, reason = %reason, "Skipping unusable JWK"),
            }
        }
        if keys.is_empty() {
            return Err(AuthEdgeError::key_fetch("JWKS contains no usable keys"));
        }

        Ok(Self {
            key_set,
            keys,
            fetched_at,
            generation,
        })
    }

    /// Verification key for `kid`.
    #[must_use]
    pub fn key(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    /// Document the snapshot was built from.
    #[must_use]
    pub const fn key_set(&self) -> &PublishedKeySet {
        &self.key_set
    }

    /// Key IDs usable for verification.
    #[must_use]
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Number of usable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the snapshot holds no usable key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When the document was fetched.
    #[must_use]
    pub const fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Monotonic snapshot counter, starting at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the snapshot is older than `max_age` at `now`.
    #[must_use]
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - self.fetched_at > max_age,
            Err(_) => false,
        }
    }
}

impl fmt::Debug for CachedKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedKeySet")
            .field("key_ids", &self.key_ids())
            .field("fetched_at", &self.fetched_at)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Outcome history of key set refreshes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStatus {
    /// Last successful refresh
    pub last_success: Option<DateTime<Utc>>,
    /// Last attempt, successful or not
    pub last_attempt: Option<DateTime<Utc>>,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

struct CacheInner {
    fetcher: Arc<dyn KeySetFetcher>,
    snapshot: ArcSwapOption<CachedKeySet>,
    status: Mutex<RefreshStatus>,
    refresh_lock: tokio::sync::Mutex<()>,
    fetch_timeout: Duration,
}

impl CacheInner {
    fn generation(&self) -> u64 {
        self.snapshot.load().as_ref().map_or(0, |s| s.generation)
    }

    async fn refresh(&self) -> Result<Arc<CachedKeySet>, AuthEdgeError> {
        let observed = self.generation();

        let guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return self.join_in_flight(observed).await,
        };

        // A refresh may have completed between reading the generation and
        // taking the lock.
        if let Some(current) = self.snapshot.load_full() {
            if current.generation > observed {
                return Ok(current);
            }
        }

        let result = self.fetch_and_install(observed).await;
        drop(guard);
        result
    }

    /// Refresh after a lookup of `kid` missed. A joined refresh is reused
    /// only if it yielded `kid`, since it may predate the key's publication.
    async fn refresh_for_key(&self, kid: &str) -> Result<Arc<CachedKeySet>, AuthEdgeError> {
        let observed = self.generation();

        let guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Ok(joined) = self.join_in_flight(observed).await {
                    if joined.key(kid).is_some() {
                        return Ok(joined);
                    }
                }
                debug!(kid = %kid, "Joined refresh lacked key id; fetching again");
                tokio::time::timeout(self.fetch_timeout, self.refresh_lock.lock())
                    .await
                    .map_err(|_| AuthEdgeError::key_fetch("timed out waiting for in-flight refresh"))?
            }
        };

        let result = self.fetch_and_install(self.generation()).await;
        drop(guard);
        result
    }

    async fn join_in_flight(&self, observed: u64) -> Result<Arc<CachedKeySet>, AuthEdgeError> {
        debug!("Waiting for in-flight JWKS refresh");
        let guard = tokio::time::timeout(self.fetch_timeout, self.refresh_lock.lock())
            .await
            .map_err(|_| AuthEdgeError::key_fetch("timed out waiting for in-flight refresh"))?;
        drop(guard);

        match self.snapshot.load_full() {
            Some(current) if current.generation > observed => Ok(current),
            _ => {
                let reason = self
                    .status
                    .lock()
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "in-flight refresh failed".to_string());
                Err(AuthEdgeError::KeyFetch { reason })
            }
        }
    }

    async fn fetch_and_install(&self, observed: u64) -> Result<Arc<CachedKeySet>, AuthEdgeError> {
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(AuthEdgeError::key_fetch("JWKS fetch timed out")),
        };
        let now = Utc::now();
        let built = fetched.and_then(|set| CachedKeySet::build(set, now, observed + 1));

        let mut status = self.status.lock();
        status.last_attempt = Some(now);
        match built {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot.store(Some(Arc::clone(&snapshot)));
                status.last_success = Some(now);
                status.consecutive_failures = 0;
                status.last_error = None;
                info!(
                    generation = snapshot.generation,
                    keys = snapshot.len(),
                    "JWKS cache updated"
                );
                Ok(snapshot)
            }
            Err(e) => {
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                status.last_error = Some(e.to_string());
                warn!(
                    error = %e,
                    consecutive_failures = status.consecutive_failures,
                    "JWKS refresh failed; keeping previous key set"
                );
                Err(e)
            }
        }
    }
}

/// Remote key set cache.
///
/// Reads never block. Refreshes are single-flight: a caller that finds a
/// refresh in progress waits for it, bounded by the fetch timeout, and
/// shares its outcome. The background task started by
/// [`RemoteKeyCache::start`] stops on [`RemoteKeyCache::shutdown`] or when
/// the cache is dropped.
pub struct RemoteKeyCache {
    inner: Arc<CacheInner>,
    refresh_interval: Duration,
    cancel_token: CancellationToken,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteKeyCache {
    /// Create a cache over an arbitrary fetcher. No fetch happens until
    /// [`RemoteKeyCache::start`] or [`RemoteKeyCache::refresh`].
    #[must_use]
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, config: &VerifierConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                snapshot: ArcSwapOption::empty(),
                status: Mutex::new(RefreshStatus::default()),
                refresh_lock: tokio::sync::Mutex::new(()),
                fetch_timeout: config.fetch_timeout,
            }),
            refresh_interval: config.refresh_interval,
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        }
    }

    /// Create a cache fetching from `config.jwks_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &VerifierConfig) -> Result<Self, AuthEdgeError> {
        let fetcher = HttpKeySetFetcher::new(config.jwks_url.clone(), config.fetch_timeout)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    /// Spawn the background refresh task. The first fetch happens
    /// immediately. Calling this again while the task runs has no effect.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    pub fn start(&self) {
        let mut handle = self.refresh_handle.lock();
        if handle.is_some() || self.cancel_token.is_cancelled() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let token = self.cancel_token.clone();
        let interval = self.refresh_interval;

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        info!("JWKS refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Failures are recorded in the refresh status.
                        let _ = inner.refresh().await;
                    }
                }
            }
        }));
    }

    /// Current snapshot, if any fetch has succeeded.
    #[must_use]
    pub fn current_set(&self) -> Option<Arc<CachedKeySet>> {
        self.inner.snapshot.load_full()
    }

    /// Refresh now, or join a refresh already in progress.
    ///
    /// # Errors
    ///
    /// Returns [`AuthEdgeError::KeyFetch`] if the fetch fails, times out or
    /// yields no usable keys. The previous snapshot stays in place.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<CachedKeySet>, AuthEdgeError> {
        self.inner.refresh().await
    }

    /// Refresh because a lookup of `kid` missed.
    ///
    /// Unlike [`RemoteKeyCache::refresh`], the outcome of a refresh already in
    /// progress is shared only if it contains `kid`; otherwise a new fetch is
    /// issued once that refresh completes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthEdgeError::KeyFetch`] if the fetch fails, times out or
    /// yields no usable keys.
    #[instrument(skip(self))]
    pub async fn refresh_for_key(&self, kid: &str) -> Result<Arc<CachedKeySet>, AuthEdgeError> {
        self.inner.refresh_for_key(kid).await
    }

    /// Refresh history.
    #[must_use]
    pub fn status(&self) -> RefreshStatus {
        self.inner.status.lock().clone()
    }

    /// Whether the background task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.refresh_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "JWKS refresh task panicked");
            }
        }
    }
}

impl Drop for RemoteKeyCache {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl fmt::Debug for RemoteKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteKeyCache")
            .field("refresh_interval", &self.refresh_interval)
            .field("generation", &self.inner.generation())
            .finish_non_exhaustive()
    }
}
