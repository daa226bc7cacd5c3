/// Bearer-token bookkeeping shared by adapters that log in with
/// credentials and receive a time-limited token.

use std::future::Future;

use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};

use crate::error::Result;

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Holds the current token and refreshes it ahead of expiry.
///
/// Reads are concurrent; at most one refresh runs at a time.
#[derive(Debug)]
pub struct TokenManager {
    token: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
    /// Tokens are treated as expired this long before their real expiry.
    refresh_margin: Duration,
}

impl TokenManager {
    pub fn new(refresh_margin: Duration) -> Self {
        TokenManager {
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_margin,
        }
    }

    /// Current token, if one is held and not inside the refresh margin.
    pub async fn current(&self) -> Option<String> {
        let guard = self.token.read().await;
        guard
            .as_ref()
            .filter(|t| Instant::now() + self.refresh_margin < t.expires_at)
            .map(|t| t.value.clone())
    }

    pub async fn store(&self, value: String, ttl: Duration) {
        *self.token.write().await = Some(CachedToken {
            value,
            expires_at: Instant::now() + ttl,
        });
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    /// Returns a valid token, calling `login` if none is held. `login`
    /// yields the token and its lifetime.
    pub async fn get_or_refresh<F, Fut>(&self, login: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration)>>,
    {
        if let Some(token) = self.current().await {
            return Ok(token);
        }
        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.current().await {
            return Ok(token);
        }
        let (value, ttl) = login().await?;
        self.store(value.clone(), ttl).await;
        tracing::debug!(ttl_secs = ttl.as_secs(), "provider token refreshed");
        Ok(value)
    }
}
