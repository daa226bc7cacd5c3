/// Rate aggregation across every enabled provider.
///
/// Providers are queried concurrently, each under its own timeout. One slow
/// or failing provider only lands in the failure list; the call as a whole
/// fails only when nobody returned a usable rate.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Duration;

use crate::cache::RateCache;
use crate::error::{ProviderFailure, Result, ShippingError};
use crate::models::provider::ProviderId;
use crate::models::rate::{AggregatedRates, RateRequest, RateSource, ShippingRate};
use crate::registry::ProviderRegistry;

pub struct RateAggregator {
    registry: Arc<ProviderRegistry>,
    cache: Arc<RateCache>,
    timeout: Duration,
}

impl RateAggregator {
    pub fn new(registry: Arc<ProviderRegistry>, cache: Arc<RateCache>, timeout: Duration) -> Self {
        RateAggregator {
            registry,
            cache,
            timeout,
        }
    }

    /// Rates for `request` from cache, or from a fan-out on miss or expiry.
    pub async fn get_rates_from_all_providers(&self, request: &RateRequest) -> Result<AggregatedRates> {
        request.validate()?;
        let key = request.cache_key();
        let registry = self.registry.clone();
        let owned = request.clone();
        let timeout = self.timeout;
        self.cache
            .get_or_refresh(&key, move || fan_out(registry, owned, timeout))
            .await
    }
}

/// Queries every enabled provider supporting the requested mode.
pub async fn fan_out(
    registry: Arc<ProviderRegistry>,
    request: RateRequest,
    timeout: Duration,
) -> Result<AggregatedRates> {
    let adapters = registry.enabled_for_mode(&request.mode);
    if adapters.is_empty() {
        tracing::warn!(mode = %request.mode, "no enabled provider supports the requested mode");
        return Err(ShippingError::NoServiceableRate {
            failures: Vec::new(),
        });
    }

    let calls = adapters.iter().map(|(id, adapter)| {
        let request = &request;
        async move {
            let outcome = match tokio::time::timeout(timeout, adapter.get_rates(request)).await {
                Ok(result) => result,
                Err(_) => Err(ShippingError::timeout(
                    id,
                    "get_rates",
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };
            (id.clone(), outcome)
        }
    });
    let outcomes = join_all(calls).await;
    merge(outcomes)
}

/// Merges per-provider outcomes in provider order.
fn merge(outcomes: Vec<(ProviderId, Result<Vec<ShippingRate>>)>) -> Result<AggregatedRates> {
    let mut rates = Vec::new();
    let mut failures = Vec::new();
    let mut empty = Vec::new();
    let mut seen: HashSet<(ProviderId, String)> = HashSet::new();

    for (id, outcome) in outcomes {
        let quotes = match outcome {
            Ok(quotes) => quotes,
            Err(e) => {
                tracing::warn!(provider_id = %id, error = %e, "provider rate fetch failed");
                failures.push(ProviderFailure::from_error(&id, &e));
                continue;
            }
        };
        if quotes.is_empty() {
            tracing::debug!(provider_id = %id, "provider returned no rates");
            empty.push(ProviderFailure::new(id.clone(), "no rates for this route"));
            continue;
        }
        for mut quote in quotes {
            if quote.provider_id != id {
                tracing::debug!(provider_id = %id, reported = %quote.provider_id, "rate re-tagged with adapter id");
                quote.provider_id = id.clone();
            }
            if !quote.rate.is_finite() || quote.rate < 0.0 {
                tracing::warn!(provider_id = %id, courier = %quote.courier_code, rate = quote.rate, "invalid rate dropped");
                continue;
            }
            if seen.insert((id.clone(), quote.courier_code.clone())) {
                rates.push(quote);
            }
        }
    }

    if rates.is_empty() {
        failures.extend(empty);
        return Err(ShippingError::NoServiceableRate { failures });
    }
    Ok(AggregatedRates {
        rates,
        failures,
        source: RateSource::Providers,
    })
}
