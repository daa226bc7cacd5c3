/// Rate Cache: adaptive-TTL cache of aggregated rates with single-flight
/// refresh.
///
/// A fresh entry is served directly. On a miss every concurrent caller joins
/// one in-flight refresh; on a stale entry the first caller refreshes while
/// the others are served the stale rates. The in-flight table keeps only weak
/// handles, so when every waiter goes away the refresh is dropped and nothing
/// is written.

pub mod store;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tokio::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::provider::ProviderId;
use crate::models::rate::{AggregatedRates, RateCacheKey, RateSource, ShippingRate};
pub use store::{CacheEntry, InMemoryRateStore, RateCacheStore};

type Refresh = Shared<BoxFuture<'static, Result<AggregatedRates>>>;
type WeakRefresh = WeakShared<BoxFuture<'static, Result<AggregatedRates>>>;

/// What to drop from the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheInvalidation {
    Key(RateCacheKey),
    /// Every entry containing a rate from this provider.
    Provider(ProviderId),
    All,
}

struct InFlight {
    generation: u64,
    refresh: WeakRefresh,
}

pub struct RateCache {
    store: Arc<dyn RateCacheStore>,
    config: CacheConfig,
    in_flight: Mutex<HashMap<RateCacheKey, InFlight>>,
    requests: Mutex<HashMap<RateCacheKey, VecDeque<Instant>>>,
    generation: AtomicU64,
    /// Bumped by every invalidation; refreshes started before it do not write.
    epoch: Arc<AtomicU64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// TTL for a key requested `prior_requests` times inside the hot window.
///
/// Cold keys get `max_ttl`; the TTL shrinks linearly and reaches `min_ttl`
/// at `hot_threshold` requests.
pub fn adaptive_ttl(config: &CacheConfig, prior_requests: usize) -> Duration {
    let (min, max) = config.ttl_window();
    let threshold = config.hot_threshold.max(1) as usize;
    if prior_requests >= threshold {
        return min;
    }
    let span = max.saturating_sub(min);
    let scale = prior_requests as f64 / threshold as f64;
    max.saturating_sub(span.mul_f64(scale)).clamp(min, max)
}

fn served(entry: &CacheEntry, source: RateSource) -> AggregatedRates {
    AggregatedRates {
        rates: entry.rates.clone(),
        failures: Vec::new(),
        source,
    }
}

impl RateCache {
    pub fn new(store: Arc<dyn RateCacheStore>, config: CacheConfig) -> Self {
        if config.min_ttl_secs > config.max_ttl_secs {
            tracing::warn!(
                min_ttl_secs = config.min_ttl_secs,
                max_ttl_secs = config.max_ttl_secs,
                "cache ttl window inverted; every entry gets the minimum ttl"
            );
        }
        RateCache {
            store,
            config,
            in_flight: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        let store = InMemoryRateStore::with_stale_grace(config.stale_grace());
        Self::new(Arc::new(store), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current entry for `key`, fresh or stale, with `refreshing` filled in.
    pub async fn get(&self, key: &RateCacheKey) -> Option<CacheEntry> {
        let mut entry = self.load(key).await?;
        entry.refreshing = self.live_refresh(key).is_some();
        Some(entry)
    }

    /// Stores `rates` under `key`. `None` picks the adaptive TTL; an explicit
    /// TTL is clamped into the configured window.
    pub async fn put(&self, key: RateCacheKey, rates: Vec<ShippingRate>, ttl: Option<Duration>) -> Result<()> {
        let ttl = match ttl {
            Some(ttl) => {
                let (min, max) = self.config.ttl_window();
                ttl.clamp(min, max)
            }
            None => self.ttl_for(&key),
        };
        self.store.put(key, CacheEntry::new(rates, ttl)).await
    }

    pub async fn invalidate(&self, scope: CacheInvalidation) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        match &scope {
            CacheInvalidation::Key(key) => {
                lock(&self.in_flight).remove(key);
                self.store.remove(key).await?;
            }
            CacheInvalidation::Provider(provider_id) => {
                lock(&self.in_flight).clear();
                let removed = self.store.remove_provider(provider_id).await?;
                tracing::debug!(provider_id = %provider_id, removed, "provider rates evicted");
            }
            CacheInvalidation::All => {
                lock(&self.in_flight).clear();
                self.store.clear().await?;
            }
        }
        tracing::info!(scope = ?scope, "rate cache invalidated");
        Ok(())
    }

    /// Serves `key` from cache or through a single-flight `refresh`.
    ///
    /// On refresh failure a stale entry is served if one exists, otherwise
    /// the refresh error is returned.
    pub async fn get_or_refresh<F, Fut>(&self, key: &RateCacheKey, refresh: F) -> Result<AggregatedRates>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AggregatedRates>> + Send + 'static,
    {
        self.note_request(key);
        let cached = self.load(key).await;
        if let Some(entry) = &cached {
            if entry.is_fresh() {
                tracing::debug!(key = %key, "rate cache hit");
                return Ok(served(entry, RateSource::Cache));
            }
        }

        let (generation, in_flight, started) = self.join_or_start(key, refresh);
        if let (Some(stale), false) = (&cached, started) {
            tracing::debug!(key = %key, "stale rates served while refresh in flight");
            return Ok(served(stale, RateSource::StaleCache));
        }
        if started {
            tracing::debug!(key = %key, stale = cached.is_some(), "rate cache refresh started");
        } else {
            tracing::debug!(key = %key, "joined in-flight rate refresh");
        }

        let outcome = in_flight.await;
        self.finish(key, generation);
        match (outcome, cached) {
            (Ok(rates), _) => Ok(rates),
            (Err(e), Some(stale)) => {
                tracing::warn!(key = %key, error = %e, "rate refresh failed; serving stale entry");
                Ok(served(&stale, RateSource::StaleCache))
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn load(&self, key: &RateCacheKey) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "rate cache read failed; treating as miss");
                None
            }
        }
    }

    fn live_refresh(&self, key: &RateCacheKey) -> Option<Refresh> {
        lock(&self.in_flight).get(key).and_then(|f| f.refresh.upgrade())
    }

    fn join_or_start<F, Fut>(&self, key: &RateCacheKey, refresh: F) -> (u64, Refresh, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AggregatedRates>> + Send + 'static,
    {
        let mut in_flight = lock(&self.in_flight);
        if let Some(existing) = in_flight.get(key) {
            if let Some(shared) = existing.refresh.upgrade() {
                return (existing.generation, shared, false);
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let shared = self.refresh_future(key.clone(), refresh()).shared();
        if let Some(weak) = shared.downgrade() {
            in_flight.insert(
                key.clone(),
                InFlight {
                    generation,
                    refresh: weak,
                },
            );
        }
        (generation, shared, true)
    }

    fn refresh_future<Fut>(&self, key: RateCacheKey, fetch: Fut) -> BoxFuture<'static, Result<AggregatedRates>>
    where
        Fut: Future<Output = Result<AggregatedRates>> + Send + 'static,
    {
        let store = self.store.clone();
        let epoch = self.epoch.clone();
        let started_epoch = epoch.load(Ordering::SeqCst);
        let ttl = self.ttl_for(&key);
        async move {
            let aggregated = fetch.await?;
            if epoch.load(Ordering::SeqCst) != started_epoch {
                tracing::debug!(key = %key, "cache invalidated during refresh; result not stored");
            } else if let Err(e) = store
                .put(key.clone(), CacheEntry::new(aggregated.rates.clone(), ttl))
                .await
            {
                tracing::warn!(key = %key, error = %e, "rate cache write failed");
            }
            Ok(aggregated)
        }
        .boxed()
    }

    fn finish(&self, key: &RateCacheKey, generation: u64) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(key).map(|f| f.generation) == Some(generation) {
            in_flight.remove(key);
        }
    }

    fn note_request(&self, key: &RateCacheKey) {
        let now = Instant::now();
        let window = self.config.hot_window();
        let mut requests = lock(&self.requests);
        let seen = requests.entry(key.clone()).or_default();
        seen.push_back(now);
        while seen.front().is_some_and(|t| now.duration_since(*t) > window) {
            seen.pop_front();
        }
        if requests.len() > 10_000 {
            requests.retain(|_, seen| seen.back().is_some_and(|t| now.duration_since(*t) <= window));
        }
    }

    fn ttl_for(&self, key: &RateCacheKey) -> Duration {
        let now = Instant::now();
        let window = self.config.hot_window();
        let recent = lock(&self.requests)
            .get(key)
            .map(|seen| seen.iter().filter(|t| now.duration_since(**t) <= window).count())
            .unwrap_or(0);
        adaptive_ttl(&self.config, recent.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShippingError;
    use crate::models::rate::{RateRequest, ShippingMode};
    use futures::future::join_all;
    use std::sync::atomic::AtomicUsize;

    fn request() -> RateRequest {
        RateRequest {
            from_pincode: "110001".to_string(),
            to_pincode: "400001".to_string(),
            weight_kg: 1.0,
            mode: ShippingMode::Surface,
            cod_amount: None,
            declared_value: None,
        }
    }

    fn rate(provider: &str, price: f64) -> ShippingRate {
        ShippingRate {
            provider_id: ProviderId::from(provider),
            provider_name: provider.to_string(),
            courier_name: "Courier".to_string(),
            courier_code: format!("{provider}_c"),
            rate: price,
            estimated_days: 3,
            mode: ShippingMode::Surface,
            available: true,
            features: None,
            performance: None,
            constraints: None,
            charges: None,
        }
    }

    fn fetched(rates: Vec<ShippingRate>) -> AggregatedRates {
        AggregatedRates {
            rates,
            failures: Vec::new(),
            source: RateSource::Providers,
        }
    }

    fn expired(rates: Vec<ShippingRate>) -> CacheEntry {
        let mut entry = CacheEntry::new(rates, Duration::from_secs(60));
        entry.expires_at = entry.cached_at - chrono::Duration::seconds(1);
        entry
    }

    #[test]
    fn test_adaptive_ttl_stays_in_window() {
        let config = CacheConfig::default();
        assert_eq!(adaptive_ttl(&config, 0), config.max_ttl());
        assert_eq!(adaptive_ttl(&config, 10), config.min_ttl());
        assert_eq!(adaptive_ttl(&config, 500), config.min_ttl());
        let mid = adaptive_ttl(&config, 5);
        assert!(mid > config.min_ttl() && mid < config.max_ttl());
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_refresh() {
        let cache = RateCache::in_memory(CacheConfig::default());
        let key = request().cache_key();
        cache.put(key.clone(), vec![rate("a", 50.0)], None).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let served = cache
            .get_or_refresh(&key, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(fetched(Vec::new()))
            })
            .await
            .unwrap();
        assert_eq!(served.source, RateSource::Cache);
        assert_eq!(served.rates.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_refresh() {
        let cache = Arc::new(RateCache::in_memory(CacheConfig::default()));
        let key = request().cache_key();
        let calls = Arc::new(AtomicUsize::new(0));
        let callers = (0..8).map(|_| {
            let (cache, key, calls) = (cache.clone(), key.clone(), calls.clone());
            async move {
                cache
                    .get_or_refresh(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(fetched(vec![rate("a", 70.0)]))
                    })
                    .await
            }
        });
        let results = join_all(callers).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref().unwrap().rates.len() == 1));
        assert!(cache.get(&key).await.unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_expired_entry_refreshes_once_and_serves_stale_meanwhile() {
        let store = Arc::new(InMemoryRateStore::new());
        let cache = Arc::new(RateCache::new(store.clone(), CacheConfig::default()));
        let key = request().cache_key();
        store.put(key.clone(), expired(vec![rate("a", 40.0)])).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let callers = (0..6).map(|_| {
            let (cache, key, calls) = (cache.clone(), key.clone(), calls.clone());
            async move {
                cache
                    .get_or_refresh(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(fetched(vec![rate("a", 45.0)]))
                    })
                    .await
                    .unwrap()
            }
        });
        let results = join_all(callers).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stale = results.iter().filter(|r| r.source == RateSource::StaleCache).count();
        let fresh = results.iter().filter(|r| r.source == RateSource::Providers).count();
        assert_eq!((stale, fresh), (5, 1));
        assert_eq!(cache.get(&key).await.unwrap().rates[0].rate, 45.0);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_or_errors() {
        let store = Arc::new(InMemoryRateStore::new());
        let cache = RateCache::new(store.clone(), CacheConfig::default());
        let key = request().cache_key();
        let failing = || async {
            Err::<AggregatedRates, _>(ShippingError::NoServiceableRate {
                failures: Vec::new(),
            })
        };

        assert!(cache.get_or_refresh(&key, failing).await.is_err());

        store.put(key.clone(), expired(vec![rate("a", 40.0)])).await.unwrap();
        let served = cache.get_or_refresh(&key, failing).await.unwrap();
        assert_eq!(served.source, RateSource::StaleCache);
        assert_eq!(served.rates[0].rate, 40.0);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_never_writes() {
        let store = Arc::new(InMemoryRateStore::new());
        let cache = RateCache::new(store.clone(), CacheConfig::default());
        let key = request().cache_key();
        let slow = cache.get_or_refresh(&key, || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(fetched(vec![rate("a", 10.0)]))
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), slow).await.is_err());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.len().await, 0);
        assert!(cache.live_refresh(&key).is_none());
    }

    #[tokio::test]
    async fn test_invalidate_by_provider() {
        let cache = RateCache::in_memory(CacheConfig::default());
        let key = request().cache_key();
        cache
            .put(key.clone(), vec![rate("a", 10.0), rate("b", 12.0)], None)
            .await
            .unwrap();
        cache
            .invalidate(CacheInvalidation::Provider(ProviderId::from("c")))
            .await
            .unwrap();
        assert!(cache.get(&key).await.is_some());
        cache
            .invalidate(CacheInvalidation::Provider(ProviderId::from("b")))
            .await
            .unwrap();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_explicit_ttl_is_clamped() {
        let cache = RateCache::in_memory(CacheConfig::default());
        let key = request().cache_key();
        cache
            .put(key.clone(), vec![rate("a", 10.0)], Some(Duration::from_secs(5)))
            .await
            .unwrap();
        let entry = cache.get(&key).await.unwrap();
        let ttl = entry.expires_at - entry.cached_at;
        assert_eq!(ttl.num_seconds(), 3600);
    }

    #[tokio::test]
    async fn test_inverted_ttl_window_does_not_panic() {
        let config = CacheConfig {
            min_ttl_secs: 10_000,
            max_ttl_secs: 100,
            ..CacheConfig::default()
        };
        assert_eq!(adaptive_ttl(&config, 3), Duration::from_secs(10_000));
        let cache = RateCache::in_memory(config);
        let key = request().cache_key();
        cache
            .put(key.clone(), vec![rate("a", 10.0)], Some(Duration::from_secs(5)))
            .await
            .unwrap();
        let entry = cache.get(&key).await.unwrap();
        assert_eq!((entry.expires_at - entry.cached_at).num_seconds(), 10_000);

        cache.invalidate(CacheInvalidation::All).await.unwrap();
        let served = cache
            .get_or_refresh(&key, || async { Ok(fetched(vec![rate("a", 11.0)])) })
            .await
            .unwrap();
        assert_eq!(served.source, RateSource::Providers);
    }
}
