// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared service-credential cache with singleflight refresh.
//!
//! ## Concurrency
//!
//! All state sits behind one mutex: the cached credential and, while a
//! refresh is running, the shared future of that refresh. A caller that finds
//! no fresh credential either joins the in-flight exchange or starts one, so
//! at most one exchange is ever outstanding and every waiter receives its
//! result, success or failure.
//!
//! The exchange runs in a spawned task which writes the outcome back to the
//! cache itself. A caller that disconnects mid-refresh only drops its handle
//! to the shared future; the cache is still updated exactly once.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::providers::IdpError;

/// Credentials closer than this to expiry are treated as expired. Never more
/// than half the credential's lifetime, so short-lived tokens still get reused.
const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(10);

/// Short-lived token from a machine-to-machine credential exchange.
#[derive(Clone)]
pub struct ServiceCredential {
    token: String,
    issued_at: Instant,
    expires_at: Instant,
}

impl ServiceCredential {
    pub fn new(token: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            token: token.into(),
            issued_at: Instant::now(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the credential stays valid for at least `margin`, capped at
    /// half its lifetime.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        let lifetime = self.expires_at.saturating_duration_since(self.issued_at);
        Instant::now() + margin.min(lifetime / 2) < self.expires_at
    }
}

impl std::fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of service credentials (a client-credentials exchange).
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    async fn exchange(&self) -> Result<ServiceCredential, IdpError>;
}

type Exchange = Shared<BoxFuture<'static, Result<ServiceCredential, IdpError>>>;

#[derive(Default)]
struct CacheState {
    cached: Option<ServiceCredential>,
    in_flight: Option<Exchange>,
    /// Incremented on invalidation so a refresh started earlier cannot
    /// resurrect a credential that was evicted while it ran.
    generation: u64,
}

#[derive(Clone)]
pub struct ServiceCredentialCache {
    source: Arc<dyn CredentialSource>,
    state: Arc<Mutex<CacheState>>,
    refresh_margin: Duration,
}

impl ServiceCredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CacheState::default())),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Return the cached credential, or join/start a refresh.
    pub async fn get(&self) -> Result<ServiceCredential, IdpError> {
        let exchange = {
            let mut state = self.lock()?;

            if let Some(credential) = state
                .cached
                .as_ref()
                .filter(|c| c.is_fresh(self.refresh_margin))
            {
                return Ok(credential.clone());
            }

            if let Some(exchange) = state.in_flight.clone() {
                debug!("Joining in-flight service credential exchange");
                exchange
            } else {
                let exchange = self.start_exchange(state.generation);
                state.in_flight = Some(exchange.clone());
                exchange
            }
        };

        exchange.await
    }

    /// Drop the cached credential, e.g. after the upstream rejected it.
    pub fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.cached = None;
            state.generation += 1;
        }
    }

    /// Whether a fresh credential is currently cached.
    pub fn is_cached(&self) -> bool {
        self.state
            .lock()
            .map(|state| {
                state
                    .cached
                    .as_ref()
                    .is_some_and(|c| c.is_fresh(self.refresh_margin))
            })
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheState>, IdpError> {
        self.state
            .lock()
            .map_err(|_| IdpError::Unavailable("credential cache lock poisoned".to_string()))
    }

    /// Spawn the exchange. Must be called with the state lock held so the
    /// task cannot publish its result before `in_flight` is set.
    fn start_exchange(&self, generation: u64) -> Exchange {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let result = source.exchange().await;

            match state.lock() {
                Ok(mut state) => {
                    state.in_flight = None;
                    match &result {
                        Ok(credential) if state.generation == generation => {
                            state.cached = Some(credential.clone());
                        }
                        Ok(_) => {}
                        Err(_) => state.cached = None,
                    }
                }
                Err(_) => warn!("Credential cache lock poisoned; result not cached"),
            }

            if let Err(e) = &result {
                warn!(error = %e, "Service credential exchange failed");
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(IdpError::Unavailable(format!(
                    "credential exchange task failed: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Credential source that counts exchanges and can be told to fail.
    pub(crate) struct CountingSource {
        pub calls: AtomicUsize,
        pub delay: Duration,
        pub lifetime: Duration,
        pub fail_with: Option<IdpError>,
    }

    impl CountingSource {
        pub(crate) fn ok(lifetime: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                lifetime,
                fail_with: None,
            }
        }

        pub(crate) fn failing(error: IdpError) -> Self {
            Self {
                fail_with: Some(error),
                ..Self::ok(Duration::from_secs(60))
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn exchange(&self) -> Result<ServiceCredential, IdpError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(ServiceCredential::new(
                    format!("svc-token-{n}"),
                    Instant::now() + self.lifetime,
                )),
            }
        }
    }

    fn cache_over(source: &Arc<CountingSource>) -> ServiceCredentialCache {
        ServiceCredentialCache::new(source.clone() as Arc<dyn CredentialSource>)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let cache = cache_over(&source);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.token(), "svc-token-1");
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter() {
        let source = Arc::new(CountingSource::failing(IdpError::Unavailable(
            "timeout".to_string(),
        )));
        let cache = cache_over(&source);

        let results =
            futures_util::future::join_all((0..8).map(|_| cache.get())).await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(IdpError::Unavailable(_)))));
        assert_eq!(source.calls(), 1);
        assert!(!cache.is_cached());
    }

    #[tokio::test]
    async fn cached_credential_is_reused_until_expiry() {
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let cache = cache_over(&source);

        for _ in 0..5 {
            cache.get().await.unwrap();
        }
        assert_eq!(source.calls(), 1);
        assert!(cache.is_cached());
    }

    #[tokio::test]
    async fn expired_credential_is_refetched() {
        let source = Arc::new(CountingSource::ok(Duration::from_millis(20)));
        let cache = cache_over(&source).with_refresh_margin(Duration::ZERO);

        let first = cache.get().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = cache.get().await.unwrap();

        assert_eq!(first.token(), "svc-token-1");
        assert_eq!(second.token(), "svc-token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_exchange_is_retried_on_next_call() {
        let source = Arc::new(CountingSource::failing(IdpError::Rejected(
            "unauthorized_client".to_string(),
        )));
        let cache = cache_over(&source);

        assert!(cache.get().await.is_err());
        assert!(cache.get().await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_new_exchange() {
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let cache = cache_over(&source);

        cache.get().await.unwrap();
        cache.invalidate();
        assert!(!cache.is_cached());
        let credential = cache.get().await.unwrap();

        assert_eq!(credential.token(), "svc-token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn abandoned_caller_does_not_corrupt_cache() {
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let cache = cache_over(&source);

        // Caller gives up before the exchange completes.
        let abandoned = tokio::time::timeout(Duration::from_millis(5), cache.get()).await;
        assert!(abandoned.is_err());

        // The spawned exchange still lands in the cache.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_cached());
        assert_eq!(cache.get().await.unwrap().token(), "svc-token-1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn short_lived_credential_is_reused() {
        // Lifetime below the default refresh margin.
        let source = Arc::new(CountingSource::ok(Duration::from_secs(4)));
        let cache = cache_over(&source);

        for _ in 0..5 {
            assert_eq!(cache.get().await.unwrap().token(), "svc-token-1");
        }
        assert_eq!(source.calls(), 1);
        assert!(cache.is_cached());
    }

    #[test]
    fn margin_is_capped_at_half_lifetime() {
        let credential = ServiceCredential::new("t", Instant::now() + Duration::from_secs(4));
        assert!(credential.is_fresh(Duration::from_secs(10)));

        let credential = ServiceCredential::new("t", Instant::now() + Duration::from_secs(300));
        assert!(credential.is_fresh(Duration::from_secs(10)));

        let expired = ServiceCredential::new("t", Instant::now());
        assert!(!expired.is_fresh(Duration::ZERO));
    }

    #[test]
    fn debug_redacts_token() {
        let credential = ServiceCredential::new("very-secret", Instant::now());
        assert!(!format!("{credential:?}").contains("very-secret"));
    }
}
