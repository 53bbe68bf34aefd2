//! # Token Cache
//!
//! Caches one access token and collapses concurrent refreshes into a single
//! request.
//!
//! ```text
//! get_token(acquire)
//!   │
//!   ├── cached and now + buffer < expires_at ──► cached token
//!   ├── refresh already in flight            ──► await the same future
//!   └── otherwise                            ──► start acquire(), share it
//!                                                 ├── Ok  → cache, all waiters get it
//!                                                 └── Err → clear, all waiters get it
//! ```

use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use secrecy::{ExposeSecret, SecretString};

use crate::error::SyncResult;

/// Refresh this long before a token actually expires.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 5 * 60;

/// A freshly acquired access token.
#[derive(Debug, Clone)]
pub struct TokenResult {
    pub access_token: SecretString,

    /// `None` for tokens that never expire (PAT).
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenResult {
    /// Token that expires `expires_in_secs` from now.
    pub fn expiring_in(access_token: impl Into<SecretString>, expires_in_secs: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in_secs)),
        }
    }
}

type TokenFuture = Shared<BoxFuture<'static, SyncResult<TokenResult>>>;

#[derive(Default)]
struct CacheState {
    cached: Option<TokenResult>,
    in_flight: Option<TokenFuture>,
}

/// Single-slot token cache with in-flight deduplication.
pub struct TokenCache {
    state: Mutex<CacheState>,
    buffer: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_EXPIRY_BUFFER_SECS))
    }
}

impl TokenCache {
    pub fn new(buffer: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            buffer,
        }
    }

    /// Returns a valid token, calling `acquire` only when none is cached
    /// and no refresh is already running.
    pub async fn get_token<F, Fut>(&self, acquire: F) -> SyncResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<TokenResult>> + Send + 'static,
    {
        let refresh = {
            let mut state = self.lock();
            if let Some(token) = state.cached.as_ref().filter(|t| self.is_valid(t)) {
                return Ok(token.access_token.expose_secret().to_string());
            }
            match &state.in_flight {
                Some(pending) => pending.clone(),
                None => {
                    let pending = acquire().boxed().shared();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        let result = refresh.clone().await;

        {
            let mut state = self.lock();
            let owns_slot = state
                .in_flight
                .as_ref()
                .is_some_and(|pending| pending.ptr_eq(&refresh));
            if owns_slot {
                state.in_flight = None;
                state.cached = result.as_ref().ok().cloned();
            }
        }

        result.map(|token| token.access_token.expose_secret().to_string())
    }

    /// Drops the cached token so the next call re-acquires.
    pub fn invalidate(&self) {
        self.lock().cached = None;
    }

    fn is_valid(&self, token: &TokenResult) -> bool {
        match token.expires_at {
            None => true,
            Some(expires_at) => Utc::now() + self.buffer < expires_at,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(
        calls: &Arc<AtomicUsize>,
        token: &'static str,
        expires_in: Option<i64>,
    ) -> impl FnOnce() -> BoxFuture<'static, SyncResult<TokenResult>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(TokenResult {
                    access_token: SecretString::from(token),
                    expires_at: expires_in.map(|s| Utc::now() + Duration::seconds(s)),
                })
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_caches_token() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_token(counting(&calls, "t1", Some(3600))).await.unwrap(), "t1");
        assert_eq!(cache.get_token(counting(&calls, "t2", Some(3600))).await.unwrap(), "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshes_inside_buffer_window() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        // Expires in four minutes: inside the five-minute buffer.
        cache.get_token(counting(&calls, "t1", Some(240))).await.unwrap();
        let token = cache.get_token(counting(&calls, "t2", Some(3600))).await.unwrap();

        assert_eq!(token, "t2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_token_without_expiry_is_kept() {
        let cache = TokenCache::new(Duration::days(365));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_token(counting(&calls, "pat", None)).await.unwrap();
        cache.get_token(counting(&calls, "other", None)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_acquisition() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_token(counting(&calls, "t1", Some(3600))),
            cache.get_token(counting(&calls, "t2", Some(3600))),
            cache.get_token(counting(&calls, "t3", Some(3600))),
        );

        assert_eq!(a.unwrap(), "t1");
        assert_eq!(b.unwrap(), "t1");
        assert_eq!(c.unwrap(), "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_all_waiters_and_clears() {
        let cache = TokenCache::default();
        let failing = || {
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Err::<TokenResult, _>(SyncError::TokenAcquisition("401".into()))
            }
            .boxed()
        };

        let (a, b) = tokio::join!(cache.get_token(failing), cache.get_token(failing));
        assert!(matches!(a, Err(SyncError::TokenAcquisition(_))));
        assert!(matches!(b, Err(SyncError::TokenAcquisition(_))));

        let calls = Arc::new(AtomicUsize::new(0));
        let token = cache.get_token(counting(&calls, "t1", Some(3600))).await.unwrap();
        assert_eq!(token, "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reacquire() {
        let cache = TokenCache::default();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_token(counting(&calls, "t1", Some(3600))).await.unwrap();
        cache.invalidate();
        let token = cache.get_token(counting(&calls, "t2", Some(3600))).await.unwrap();
        assert_eq!(token, "t2");
    }

    #[test]
    fn test_token_result_debug_is_redacted() {
        let token = TokenResult::expiring_in("eyJhbGciOi.secret", 3600);
        let printed = format!("{:?}", token);
        assert!(!printed.contains("eyJhbGciOi"));
        assert_eq!(token.access_token.expose_secret(), "eyJhbGciOi.secret");
    }
}
