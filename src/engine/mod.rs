/// Shipping Engine: rate shopping, selection, fallback booking and tracking
/// across every configured provider.
///
/// `ShippingEngine` is the single entry point the serverless handlers and the
/// CLI use. It wires the provider registry, rate cache, aggregator, selector,
/// orchestrator and webhook normalizer together.

pub mod aggregator;
pub mod fallback;
pub mod orchestrator;
pub mod strategy;

use std::sync::Arc;

use crate::cache::{CacheInvalidation, InMemoryRateStore, RateCache, RateCacheStore};
use crate::config::{EngineConfig, ProviderRecord};
use crate::error::Result;
use crate::events::{EventSink, TracingEventSink};
use crate::models::provider::{ProviderId, ProviderInfo};
use crate::models::rate::{AggregatedRates, RateRequest, ShippingRate};
use crate::models::selection::{SelectionCriteria, SelectionResult};
use crate::models::shipment::{Shipment, ShipmentOrder, ShipmentStatus, TrackingInfo};
use crate::models::webhook::WebhookEvent;
use crate::registry::factory::DefaultProviderFactory;
use crate::registry::ProviderRegistry;
use crate::webhook::{ShipmentStatusTracker, WebhookNormalizer};
use aggregator::RateAggregator;
use fallback::ShipmentOutcome;
use orchestrator::ShipmentOrchestrator;

pub struct ShippingEngine {
    config: EngineConfig,
    registry: Arc<ProviderRegistry>,
    cache: Arc<RateCache>,
    aggregator: Arc<RateAggregator>,
    orchestrator: ShipmentOrchestrator,
    webhooks: WebhookNormalizer,
    tracker: ShipmentStatusTracker,
}

impl ShippingEngine {
    /// Creates an engine over an already populated registry.
    pub fn new(
        config: EngineConfig,
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn RateCacheStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let cache = Arc::new(RateCache::new(store, config.cache.clone()));
        let aggregator = Arc::new(RateAggregator::new(
            registry.clone(),
            cache.clone(),
            config.provider_timeout(),
        ));
        let orchestrator = ShipmentOrchestrator::new(
            registry.clone(),
            aggregator.clone(),
            events.clone(),
            config.shipment_timeout(),
        );
        let webhooks = WebhookNormalizer::new(registry.clone(), events, config.unsigned_webhooks);
        ShippingEngine {
            config,
            registry,
            cache,
            aggregator,
            orchestrator,
            webhooks,
            tracker: ShipmentStatusTracker::new(),
        }
    }

    /// Builds and initializes every configured adapter, with an in-memory
    /// rate store and audit events written to the log.
    pub async fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let registry = ProviderRegistry::from_records(&config.providers, &DefaultProviderFactory).await?;
        tracing::info!(
            configured = config.providers.len(),
            enabled = registry.count(),
            "shipping engine ready"
        );
        let store = Arc::new(InMemoryRateStore::with_stale_grace(config.cache.stale_grace()));
        Ok(Self::new(
            config,
            Arc::new(registry),
            store,
            Arc::new(TracingEventSink),
        ))
    }

    /// Loads `EngineConfig` from the environment and builds the engine.
    pub async fn from_env() -> Result<Self> {
        Self::from_config(EngineConfig::from_env()?).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub async fn get_rates_from_all_providers(&self, request: &RateRequest) -> Result<AggregatedRates> {
        self.aggregator.get_rates_from_all_providers(request).await
    }

    /// Ranks `rates` under `criteria`, using the registry's priorities.
    pub fn select(&self, rates: &[ShippingRate], criteria: &SelectionCriteria) -> Result<Option<SelectionResult>> {
        strategy::select(rates, criteria, &self.registry.priorities())
    }

    /// Aggregates rates for `request` and selects the best one.
    pub async fn get_best_rate(
        &self,
        request: &RateRequest,
        criteria: &SelectionCriteria,
    ) -> Result<Option<SelectionResult>> {
        let aggregated = self.get_rates_from_all_providers(request).await?;
        self.select(&aggregated.rates, criteria)
    }

    pub async fn create_shipment_with_fallback(
        &self,
        order: &ShipmentOrder,
        criteria: Option<&SelectionCriteria>,
    ) -> Result<Shipment> {
        self.create_shipment_with_attempts(order, criteria)
            .await
            .map(|outcome| outcome.shipment)
    }

    /// Like `create_shipment_with_fallback`, also returning every attempt made.
    pub async fn create_shipment_with_attempts(
        &self,
        order: &ShipmentOrder,
        criteria: Option<&SelectionCriteria>,
    ) -> Result<ShipmentOutcome> {
        let outcome = self.orchestrator.create_shipment_with_fallback(order, criteria).await?;
        self.track_created(&outcome.shipment);
        Ok(outcome)
    }

    pub async fn create_shipment_for_rate(&self, order: &ShipmentOrder, rate: &ShippingRate) -> Result<Shipment> {
        let outcome = self.orchestrator.create_shipment_for_rate(order, rate).await?;
        self.track_created(&outcome.shipment);
        Ok(outcome.shipment)
    }

    fn track_created(&self, shipment: &Shipment) {
        self.tracker
            .register(&shipment.provider_id, &shipment.tracking_number, shipment.status);
    }

    pub async fn track_shipment(&self, tracking_number: &str, provider_id: &ProviderId) -> Result<TrackingInfo> {
        let info = self.orchestrator.track_shipment(tracking_number, provider_id).await?;
        self.tracker.advance(provider_id, tracking_number, info.status);
        Ok(info)
    }

    pub async fn cancel_shipment(&self, tracking_number: &str, provider_id: &ProviderId) -> Result<()> {
        self.orchestrator.cancel_shipment(tracking_number, provider_id).await?;
        self.tracker
            .advance(provider_id, tracking_number, ShipmentStatus::Cancelled);
        Ok(())
    }

    /// Normalizes a webhook and applies it to the tracked shipment status.
    pub async fn ingest_webhook(
        &self,
        provider_id: &ProviderId,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent> {
        let event = self.webhooks.ingest(provider_id, raw_payload, signature).await?;
        self.tracker.apply(&event);
        Ok(event)
    }

    /// Last known status of a shipment seen by this engine.
    pub fn shipment_status(&self, provider_id: &ProviderId, tracking_number: &str) -> Option<ShipmentStatus> {
        self.tracker.status(provider_id, tracking_number)
    }

    pub fn get_available_providers(&self) -> Vec<ProviderInfo> {
        self.registry.available_providers()
    }

    pub fn get_provider_count(&self) -> usize {
        self.registry.count()
    }

    pub async fn invalidate_rates(&self, scope: CacheInvalidation) -> Result<()> {
        self.cache.invalidate(scope).await
    }

    /// Re-applies admin provider settings and drops cached aggregates built
    /// under the old settings.
    pub async fn reload_providers(&self, records: &[ProviderRecord]) -> Result<()> {
        self.registry.reload(records);
        self.cache.invalidate(CacheInvalidation::All).await
    }
}
