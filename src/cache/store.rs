use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Duration;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::provider::ProviderId;
use crate::models::rate::{RateCacheKey, ShippingRate};

/// One cached aggregate for a rate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub rates: Vec<ShippingRate>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set by `RateCache::get` when a refresh for this key is in flight.
    #[serde(skip)]
    pub refreshing: bool,
}

impl CacheEntry {
    pub fn new(rates: Vec<ShippingRate>, ttl: Duration) -> Self {
        let cached_at = Utc::now();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        CacheEntry {
            rates,
            cached_at,
            expires_at: cached_at + chrono::Duration::milliseconds(ttl_ms),
            refreshing: false,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    pub fn mentions(&self, provider_id: &ProviderId) -> bool {
        self.rates.iter().any(|r| &r.provider_id == provider_id)
    }
}

/// Storage behind the rate cache. Swappable for a shared store (Redis, etc.).
#[async_trait]
pub trait RateCacheStore: Send + Sync {
    async fn get(&self, key: &RateCacheKey) -> Result<Option<CacheEntry>>;
    async fn put(&self, key: RateCacheKey, entry: CacheEntry) -> Result<()>;
    async fn remove(&self, key: &RateCacheKey) -> Result<()>;
    /// Drops every entry containing a rate from `provider_id`. Returns how many.
    async fn remove_provider(&self, provider_id: &ProviderId) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
}

/// Process-local store.
///
/// Expired entries stay readable for `stale_grace` so a failed refresh can
/// still serve them; past that they are evicted on the next write.
#[derive(Debug)]
pub struct InMemoryRateStore {
    entries: RwLock<HashMap<RateCacheKey, CacheEntry>>,
    stale_grace: chrono::Duration,
}

impl Default for InMemoryRateStore {
    fn default() -> Self {
        Self::with_stale_grace(CacheConfig::default().stale_grace())
    }
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_grace(grace: Duration) -> Self {
        let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        InMemoryRateStore {
            entries: RwLock::new(HashMap::new()),
            stale_grace: chrono::Duration::milliseconds(grace_ms),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn is_evictable(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry
            .expires_at
            .checked_add_signed(self.stale_grace)
            .is_some_and(|evict_at| evict_at <= now)
    }

    /// Drops every entry past its stale grace. Returns how many.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_evictable(entry, now));
        before - entries.len()
    }
}

#[async_trait]
impl RateCacheStore for InMemoryRateStore {
    async fn get(&self, key: &RateCacheKey) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|entry| !self.is_evictable(entry, now))
            .cloned())
    }

    async fn put(&self, key: RateCacheKey, entry: CacheEntry) -> Result<()> {
        let evicted = self.purge_expired().await;
        if evicted > 0 {
            tracing::debug!(evicted, "expired rate entries evicted");
        }
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn remove(&self, key: &RateCacheKey) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_provider(&self, provider_id: &ProviderId) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.mentions(provider_id));
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rate::{RateRequest, ShippingMode};

    fn key(to_pincode: &str) -> RateCacheKey {
        RateRequest {
            from_pincode: "110001".to_string(),
            to_pincode: to_pincode.to_string(),
            weight_kg: 1.0,
            mode: ShippingMode::Surface,
            cod_amount: None,
            declared_value: None,
        }
        .cache_key()
    }

    fn expired_by(age: chrono::Duration) -> CacheEntry {
        let mut entry = CacheEntry::new(Vec::new(), Duration::from_secs(60));
        entry.expires_at = Utc::now() - age;
        entry
    }

    #[tokio::test]
    async fn test_entries_past_grace_are_evicted() {
        let store = InMemoryRateStore::with_stale_grace(Duration::from_secs(600));
        store.put(key("400001"), expired_by(chrono::Duration::hours(1))).await.unwrap();
        store.put(key("560001"), expired_by(chrono::Duration::minutes(1))).await.unwrap();
        assert!(store.get(&key("400001")).await.unwrap().is_none());
        assert!(store.get(&key("560001")).await.unwrap().is_some());

        store
            .put(key("600001"), CacheEntry::new(Vec::new(), Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.purge_expired().await, 0);
    }
}
