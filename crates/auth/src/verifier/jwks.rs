//! Signing-key cache for the identity provider's published key set.
//!
//! Readers load an immutable snapshot without locking. Refreshes are
//! single-flight: a caller that missed on generation `g` waits for the
//! refresh lock and, if some other caller already installed a newer
//! snapshot, re-checks that one instead of fetching again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::VerificationError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeySourceError {
    #[error("key fetch timed out")]
    Timeout,

    #[error("key fetch failed: {0}")]
    Transport(String),

    #[error("key set invalid: {0}")]
    Invalid(String),

    #[error("key refresh throttled after a recent failure")]
    Throttled,

    #[error("timed out waiting for an in-flight key refresh")]
    RefreshWait,
}

/// Where the published signing keys come from (the IdP's discovery
/// endpoint in production, a fixed set in tests).
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, KeySourceError>;
}

#[derive(Debug, Clone)]
pub struct KeyCachePolicy {
    /// Snapshots older than this are refreshed before use.
    pub ttl: Duration,
    /// Bound on a single fetch attempt.
    pub fetch_timeout: Duration,
    /// Attempts per refresh (at least one).
    pub attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub backoff: Duration,
    /// Minimum spacing between fetch attempts that were not forced by TTL
    /// expiry, and between retries after a failed refresh.
    pub min_refresh_interval: Duration,
    /// Bound on waiting for another caller's refresh to finish.
    pub refresh_wait: Duration,
}

impl Default for KeyCachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(crate::config::DEFAULT_KEY_TTL_SECS),
            fetch_timeout: Duration::from_secs(5),
            attempts: 3,
            backoff: Duration::from_millis(100),
            min_refresh_interval: Duration::from_secs(
                crate::config::DEFAULT_KEY_MIN_REFRESH_INTERVAL_SECS,
            ),
            refresh_wait: Duration::from_millis(crate::config::DEFAULT_KEY_REFRESH_WAIT_MS),
        }
    }
}

struct KeySnapshot {
    generation: u64,
    fetched_at: Option<Instant>,
    keys: HashMap<String, DecodingKey>,
}

impl KeySnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            fetched_at: None,
            keys: HashMap::new(),
        }
    }

    fn from_set(generation: u64, set: &JwkSet) -> Self {
        let mut keys = HashMap::with_capacity(set.keys.len());
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                debug!("skipping published key without kid");
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(e) => warn!(%kid, error = %e, "skipping unusable published key"),
            }
        }

        Self {
            generation,
            fetched_at: Some(Instant::now()),
            keys,
        }
    }
}

/// Bookkeeping guarded by the refresh lock.
#[derive(Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    last_failed: bool,
}

/// Process-wide cache of the IdP's signing keys, indexed by key id.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    policy: KeyCachePolicy,
    snapshot: ArcSwap<KeySnapshot>,
    refresh: Mutex<RefreshState>,
}

impl KeyCache {
    pub fn new(source: Arc<dyn KeySource>, policy: KeyCachePolicy) -> Self {
        Self {
            source,
            policy,
            snapshot: ArcSwap::from_pointee(KeySnapshot::empty()),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    /// Populate the cache eagerly (e.g. at startup).
    pub async fn prime(&self) -> Result<usize, KeySourceError> {
        let observed = self.snapshot.load().generation;
        let snapshot = self.refresh_after(observed).await?;
        Ok(snapshot.keys.len())
    }

    /// Resolve the decoding key for `kid`, refreshing on a miss or when the
    /// cached set is older than the TTL.
    ///
    /// A kid still unknown after refresh fails closed with
    /// `SignatureInvalid`; an unobtainable key set with `KeysUnavailable`.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerificationError> {
        let current = self.snapshot.load_full();
        if !self.is_stale(&current) {
            if let Some(key) = current.keys.get(kid) {
                return Ok(key.clone());
            }
        }

        let refreshed = self
            .refresh_after(current.generation)
            .await
            .map_err(|e| {
                match &e {
                    KeySourceError::Throttled => debug!(error = %e, "signing keys unavailable"),
                    _ => warn!(error = %e, "signing keys unavailable"),
                }
                VerificationError::KeysUnavailable
            })?;

        refreshed
            .keys
            .get(kid)
            .cloned()
            .ok_or(VerificationError::SignatureInvalid)
    }

    fn is_stale(&self, snapshot: &KeySnapshot) -> bool {
        match snapshot.fetched_at {
            None => true,
            Some(at) => at.elapsed() > self.policy.ttl,
        }
    }

    async fn refresh_after(&self, observed: u64) -> Result<Arc<KeySnapshot>, KeySourceError> {
        let mut state = tokio::time::timeout(self.policy.refresh_wait, self.refresh.lock())
            .await
            .map_err(|_| KeySourceError::RefreshWait)?;

        let current = self.snapshot.load_full();
        let stale = self.is_stale(&current);
        if current.generation > observed && !stale {
            // Another caller refreshed while we waited.
            return Ok(current);
        }

        if let Some(at) = state.last_attempt {
            if at.elapsed() < self.policy.min_refresh_interval {
                if !stale {
                    debug!("key refresh throttled; answering from the current key set");
                    return Ok(current);
                }
                if state.last_failed {
                    return Err(KeySourceError::Throttled);
                }
            }
        }

        state.last_attempt = Some(Instant::now());
        let set = match self.fetch_with_retry().await {
            Ok(set) => set,
            Err(e) => {
                state.last_failed = true;
                return Err(e);
            }
        };
        state.last_failed = false;

        let next = Arc::new(KeySnapshot::from_set(current.generation + 1, &set));
        info!(
            generation = next.generation,
            keys = next.keys.len(),
            "signing keys refreshed"
        );
        self.snapshot.store(Arc::clone(&next));
        Ok(next)
    }

    async fn fetch_with_retry(&self) -> Result<JwkSet, KeySourceError> {
        let attempts = self.policy.attempts.max(1);
        let mut delay = self.policy.backoff;
        let mut last_error = KeySourceError::Timeout;

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.policy.fetch_timeout, self.source.fetch()).await {
                Ok(Ok(set)) => return Ok(set),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "signing key fetch failed");
                    last_error = e;
                }
                Err(_) => {
                    warn!(attempt, "signing key fetch timed out");
                    last_error = KeySourceError::Timeout;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");
    const KID: &str = "idp-key-1";

    struct CountingSource {
        set: Option<JwkSet>,
        delay: Duration,
        fetches: AtomicUsize,
    }

    impl CountingSource {
        fn new(set: Option<&str>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                set: set.map(|s| serde_json::from_str(s).unwrap()),
                delay,
                fetches: AtomicUsize::new(0),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySource for CountingSource {
        async fn fetch(&self) -> Result<JwkSet, KeySourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.set
                .clone()
                .ok_or_else(|| KeySourceError::Transport("connection refused".into()))
        }
    }

    fn policy() -> KeyCachePolicy {
        KeyCachePolicy {
            attempts: 1,
            ..KeyCachePolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kids_cannot_force_a_fetch_per_request() {
        let source = CountingSource::new(Some(JWKS), Duration::ZERO);
        let cache = KeyCache::new(source.clone(), policy());

        assert!(cache.decoding_key(KID).await.is_ok());
        assert_eq!(source.fetches(), 1);

        for i in 0..50 {
            let kid = format!("unknown-{i}");
            assert!(matches!(
                cache.decoding_key(&kid).await,
                Err(VerificationError::SignatureInvalid)
            ));
        }
        assert_eq!(source.fetches(), 1);
        // Known keys keep working throughout.
        assert!(cache.decoding_key(KID).await.is_ok());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            cache.decoding_key("unknown-late").await,
            Err(VerificationError::SignatureInvalid)
        ));
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_is_not_retried_inside_the_interval() {
        let source = CountingSource::new(None, Duration::ZERO);
        let cache = KeyCache::new(source.clone(), policy());

        for _ in 0..10 {
            assert!(matches!(
                cache.decoding_key(KID).await,
                Err(VerificationError::KeysUnavailable)
            ));
        }
        assert_eq!(source.fetches(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.decoding_key(KID).await.is_err());
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_an_in_flight_refresh_is_bounded() {
        let source = CountingSource::new(Some(JWKS), Duration::from_secs(10));
        let cache = Arc::new(KeyCache::new(
            source.clone(),
            KeyCachePolicy {
                fetch_timeout: Duration::from_secs(60),
                refresh_wait: Duration::from_secs(1),
                ..policy()
            },
        ));

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.decoding_key(KID).await.is_ok() })
        };
        tokio::task::yield_now().await;

        let started = Instant::now();
        assert!(matches!(
            cache.decoding_key(KID).await,
            Err(VerificationError::KeysUnavailable)
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(1));

        assert!(leader.await.unwrap());
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn prime_reports_loaded_keys() {
        let source = CountingSource::new(Some(JWKS), Duration::ZERO);
        let cache = KeyCache::new(source, policy());
        assert_eq!(cache.prime().await, Ok(1));
    }
}
