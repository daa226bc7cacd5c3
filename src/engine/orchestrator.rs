/// Shipment Orchestrator: books a shipment with sequential provider fallback.
///
/// Providers are tried one at a time in plan order, each under the shipment
/// timeout, and never more than once per call. The first success ends the
/// loop; no provider is contacted after it.

use std::sync::Arc;

use serde_json::json;
use tokio::time::{Duration, Instant};

use super::aggregator::RateAggregator;
use super::fallback::{FallbackPlan, FallbackState, ShipmentAttempt, ShipmentOutcome};
use super::strategy;
use crate::error::{ProviderFailure, Result, ShippingError};
use crate::events::EventSink;
use crate::models::event::{ShippingEvent, ShippingEventKind};
use crate::models::provider::ProviderId;
use crate::models::rate::ShippingRate;
use crate::models::selection::SelectionCriteria;
use crate::models::shipment::{CreateShipmentInput, Shipment, ShipmentOrder, TrackingInfo};
use crate::provider::ShippingProvider;
use crate::registry::ProviderRegistry;

pub struct ShipmentOrchestrator {
    registry: Arc<ProviderRegistry>,
    aggregator: Arc<RateAggregator>,
    events: Arc<dyn EventSink>,
    timeout: Duration,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Outcome of ranking a route's quotes under some criteria.
enum Ranking {
    /// Nothing on the route was quoted.
    Unquoted,
    /// Quotes exist but none satisfies the criteria.
    Rejected(Vec<ShippingRate>),
    /// Quotes in ranking order, best first.
    Ranked(Vec<ShippingRate>),
}

fn no_match(order: &ShipmentOrder, criteria: &SelectionCriteria, quoted: usize) -> ShippingError {
    let mut limits = Vec::new();
    if let Some(max_cost) = criteria.max_cost {
        limits.push(format!("max_cost {max_cost:.2}"));
    }
    if let Some(max_days) = criteria.max_days {
        limits.push(format!("max_days {max_days}"));
    }
    let limits = if limits.is_empty() {
        String::new()
    } else {
        format!(" ({})", limits.join(", "))
    };
    tracing::warn!(
        order_id = %order.order_id,
        strategy = criteria.strategy.name(),
        quoted,
        "no quote satisfies the criteria; nothing booked"
    );
    ShippingError::NoRateMatchesCriteria(format!(
        "none of {quoted} quotes satisfies {}{limits}",
        criteria.strategy.name()
    ))
}

impl ShipmentOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        aggregator: Arc<RateAggregator>,
        events: Arc<dyn EventSink>,
        timeout: Duration,
    ) -> Self {
        ShipmentOrchestrator {
            registry,
            aggregator,
            events,
            timeout,
        }
    }

    /// Books `order`, choosing providers by `criteria` or, without criteria,
    /// by registry priority.
    pub async fn create_shipment_with_fallback(
        &self,
        order: &ShipmentOrder,
        criteria: Option<&SelectionCriteria>,
    ) -> Result<ShipmentOutcome> {
        order.validate()?;
        let plan = self.plan(order, criteria).await?;
        self.execute(order, plan).await
    }

    /// Books `order` with the provider behind an already chosen `rate`,
    /// falling back to the other enabled providers by priority.
    pub async fn create_shipment_for_rate(&self, order: &ShipmentOrder, rate: &ShippingRate) -> Result<ShipmentOutcome> {
        order.validate()?;
        self.registry.enabled_adapter(&rate.provider_id)?;
        let plan = FallbackPlan::for_rate(rate, self.registry.enabled_providers());
        self.execute(order, plan).await
    }

    pub async fn track_shipment(&self, tracking_number: &str, provider_id: &ProviderId) -> Result<TrackingInfo> {
        let adapter = self.registry.adapter_for(provider_id)?;
        match tokio::time::timeout(self.timeout, adapter.track_shipment(tracking_number)).await {
            Ok(result) => result,
            Err(_) => Err(ShippingError::timeout(provider_id, "track_shipment", millis(self.timeout))),
        }
    }

    pub async fn cancel_shipment(&self, tracking_number: &str, provider_id: &ProviderId) -> Result<()> {
        let adapter = self.registry.adapter_for(provider_id)?;
        match tokio::time::timeout(self.timeout, adapter.cancel_shipment(tracking_number)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ShippingError::timeout(provider_id, "cancel_shipment", millis(self.timeout)))
            }
        }
        tracing::info!(provider_id = %provider_id, tracking_number, "shipment cancelled");
        self.emit(ShippingEvent::new(ShippingEventKind::ShipmentCancelled, provider_id.clone()).tracking(tracking_number))
            .await;
        Ok(())
    }

    /// Builds the try order for `order`.
    ///
    /// Registry priority order is used only when no criteria were given or
    /// nothing on the route was quoted. Quotes that all fail the criteria
    /// end the call before any provider is contacted.
    async fn plan(&self, order: &ShipmentOrder, criteria: Option<&SelectionCriteria>) -> Result<FallbackPlan> {
        let Some(criteria) = criteria else {
            return Ok(FallbackPlan::from_priority(self.registry.enabled_providers()));
        };

        if let Some(provider_id) = criteria.specific_provider_id() {
            self.registry.enabled_adapter(provider_id)?;
            let courier = match self.rank(order, criteria).await? {
                Ranking::Ranked(ranked) => ranked
                    .into_iter()
                    .find(|r| &r.provider_id == provider_id)
                    .map(|r| r.courier_code),
                Ranking::Rejected(quotes) if quotes.iter().any(|q| &q.provider_id == provider_id) => {
                    return Err(no_match(order, criteria, quotes.len()));
                }
                // The provider did not quote this route; let it pick a courier.
                Ranking::Rejected(_) | Ranking::Unquoted => None,
            };
            return Ok(FallbackPlan::single(provider_id.clone(), courier));
        }

        match self.rank(order, criteria).await? {
            Ranking::Ranked(ranked) => Ok(FallbackPlan::from_ranking(&ranked)),
            Ranking::Rejected(quotes) => Err(no_match(order, criteria, quotes.len())),
            Ranking::Unquoted => {
                tracing::info!(
                    order_id = %order.order_id,
                    strategy = criteria.strategy.name(),
                    "no quotes for route; falling back to priority order"
                );
                Ok(FallbackPlan::from_priority(self.registry.enabled_providers()))
            }
        }
    }

    /// Quotes for the order's route, ranked under `criteria`.
    async fn rank(&self, order: &ShipmentOrder, criteria: &SelectionCriteria) -> Result<Ranking> {
        let aggregated = match self.aggregator.get_rates_from_all_providers(&order.rate_request()).await {
            Ok(aggregated) => aggregated,
            Err(e @ ShippingError::NoServiceableRate { .. }) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "rate lookup found nothing serviceable");
                return Ok(Ranking::Unquoted);
            }
            Err(e) => return Err(e),
        };
        match strategy::select(&aggregated.rates, criteria, &self.registry.priorities())? {
            Some(selection) => Ok(Ranking::Ranked(
                std::iter::once(selection.selected_rate)
                    .chain(selection.alternative_rates)
                    .collect(),
            )),
            None => Ok(Ranking::Rejected(aggregated.rates)),
        }
    }

    async fn attempt(
        &self,
        adapter: Arc<dyn ShippingProvider>,
        input: &CreateShipmentInput,
        id: &ProviderId,
    ) -> Result<Shipment> {
        match tokio::time::timeout(self.timeout, adapter.create_shipment(input)).await {
            Ok(result) => result,
            Err(_) => Err(ShippingError::timeout(id, "create_shipment", millis(self.timeout))),
        }
    }

    async fn execute(&self, order: &ShipmentOrder, plan: FallbackPlan) -> Result<ShipmentOutcome> {
        if plan.is_empty() {
            tracing::error!(order_id = %order.order_id, "no enabled provider to book with");
            return Err(ShippingError::AllProvidersFailed { failures: Vec::new() });
        }
        let mut state = FallbackState::Pending;
        let mut attempts = Vec::with_capacity(plan.len());
        let mut failures = Vec::new();

        for (index, candidate) in plan.candidates().iter().enumerate() {
            let attempt_number = index as u32 + 1;
            let id = &candidate.provider_id;
            state = FallbackState::Trying(id.clone());
            tracing::info!(order_id = %order.order_id, provider_id = %id, attempt = attempt_number, state = %state, "trying provider");
            self.emit(
                ShippingEvent::new(ShippingEventKind::ProviderTried, id.clone())
                    .order(&order.order_id)
                    .detail(json!({ "attempt": attempt_number, "courier_code": candidate.courier_code })),
            )
            .await;

            let started = Instant::now();
            let input = CreateShipmentInput {
                order: order.clone(),
                courier_code: candidate.courier_code.clone(),
            };
            let result = match self.registry.enabled_adapter(id) {
                Ok(adapter) => self.attempt(adapter, &input, id).await,
                Err(e) => Err(e),
            };
            let latency_ms = millis(started.elapsed());

            match result {
                Ok(mut shipment) => {
                    shipment.provider_id = id.clone();
                    state = FallbackState::Succeeded(id.clone());
                    tracing::info!(
                        order_id = %order.order_id,
                        provider_id = %id,
                        tracking_number = %shipment.tracking_number,
                        attempt = attempt_number,
                        state = %state,
                        "shipment created"
                    );
                    attempts.push(ShipmentAttempt {
                        attempt_number,
                        provider_id: id.clone(),
                        courier_code: candidate.courier_code.clone(),
                        succeeded: true,
                        error: None,
                        latency_ms,
                    });
                    self.emit(
                        ShippingEvent::new(ShippingEventKind::ShipmentCreated, id.clone())
                            .order(&order.order_id)
                            .tracking(&shipment.tracking_number)
                            .detail(json!({
                                "attempt": attempt_number,
                                "courier_name": shipment.courier_name,
                                "shipping_cost": shipment.shipping_cost,
                            })),
                    )
                    .await;
                    return Ok(ShipmentOutcome { shipment, attempts });
                }
                Err(e) => {
                    state = FallbackState::FailedTryNext(id.clone());
                    if e.is_provider_scoped() {
                        tracing::warn!(
                            order_id = %order.order_id,
                            provider_id = %id,
                            attempt = attempt_number,
                            error = %e,
                            state = %state,
                            "provider failed to create shipment"
                        );
                    } else {
                        // Removed or disabled between planning and this attempt.
                        tracing::error!(
                            order_id = %order.order_id,
                            provider_id = %id,
                            attempt = attempt_number,
                            error = %e,
                            state = %state,
                            "provider unusable for shipment"
                        );
                    }
                    self.emit(
                        ShippingEvent::new(ShippingEventKind::ProviderFailed, id.clone())
                            .order(&order.order_id)
                            .detail(json!({ "attempt": attempt_number, "reason": e.to_string() })),
                    )
                    .await;
                    attempts.push(ShipmentAttempt {
                        attempt_number,
                        provider_id: id.clone(),
                        courier_code: candidate.courier_code.clone(),
                        succeeded: false,
                        error: Some(e.to_string()),
                        latency_ms,
                    });
                    failures.push(ProviderFailure::from_error(id, &e));
                }
            }
        }

        debug_assert!(!state.is_final());
        state = FallbackState::ExhaustedAllFailed;
        tracing::error!(
            order_id = %order.order_id,
            attempts = attempts.len(),
            state = %state,
            "every provider failed to create the shipment"
        );
        Err(ShippingError::AllProvidersFailed { failures })
    }

    async fn emit(&self, event: ShippingEvent) {
        let kind = event.kind;
        if let Err(e) = self.events.append(event).await {
            tracing::warn!(kind = %kind, error = %e, "event sink append failed");
        }
    }
}
