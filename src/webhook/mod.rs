/// Webhook Normalizer: turns carrier callbacks into canonical tracking events.
///
/// Authentication happens before parsing: a payload whose signature fails
/// never reaches the adapter and never produces an event. Mapping is pure,
/// so redelivering the same payload yields the same event; deduplication is
/// left to consumers such as `ShipmentStatusTracker`.

pub mod tracker;

use std::sync::Arc;

use serde_json::json;

use crate::config::UnsignedWebhookPolicy;
use crate::error::{Result, ShippingError};
use crate::events::EventSink;
use crate::models::event::{ShippingEvent, ShippingEventKind};
use crate::models::provider::ProviderId;
use crate::models::webhook::WebhookEvent;
use crate::registry::ProviderRegistry;

pub use tracker::{ShipmentStatusTracker, TransitionOutcome};

pub struct WebhookNormalizer {
    registry: Arc<ProviderRegistry>,
    events: Arc<dyn EventSink>,
    unsigned: UnsignedWebhookPolicy,
}

impl WebhookNormalizer {
    pub fn new(registry: Arc<ProviderRegistry>, events: Arc<dyn EventSink>, unsigned: UnsignedWebhookPolicy) -> Self {
        WebhookNormalizer {
            registry,
            events,
            unsigned,
        }
    }

    /// Authenticates, parses and normalizes one webhook delivery.
    pub async fn ingest(&self, provider_id: &ProviderId, raw_payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        let event = match self.normalize(provider_id, raw_payload, signature) {
            Ok(event) => event,
            Err(e) if e.is_security_relevant() => {
                tracing::error!(provider_id = %provider_id, error = %e, security = true, "webhook rejected");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(provider_id = %provider_id, error = %e, "webhook payload rejected");
                return Err(e);
            }
        };

        let audit = ShippingEvent::new(ShippingEventKind::WebhookIngested, provider_id.clone())
            .tracking(&event.tracking_number)
            .detail(json!({
                "status": event.status,
                "provider_status": event.provider_status,
                "timestamp": event.timestamp,
            }));
        if let Err(e) = self.events.append(audit).await {
            tracing::warn!(provider_id = %provider_id, error = %e, "event sink append failed");
        }
        tracing::info!(
            provider_id = %provider_id,
            tracking_number = %event.tracking_number,
            status = %event.status,
            "webhook ingested"
        );
        Ok(event)
    }

    fn normalize(&self, provider_id: &ProviderId, raw_payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        let adapter = self.registry.adapter_for(provider_id)?;

        match signature.and_then(|sig| adapter.validate_webhook(raw_payload, sig)) {
            Some(true) => {}
            Some(false) => {
                return Err(ShippingError::SignatureInvalid {
                    provider_id: provider_id.clone(),
                    reason: "signature does not match".to_string(),
                })
            }
            None => self.check_unsigned(provider_id, signature.is_some())?,
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_payload)
            .map_err(|e| ShippingError::payload(provider_id, format!("webhook body is not JSON: {e}")))?;
        let event = adapter.handle_webhook(&payload)?;

        if adapter.map_status(&event.provider_status).is_none() {
            tracing::warn!(
                provider_id = %provider_id,
                provider_status = %event.provider_status,
                mapped = %event.status,
                "unmapped provider status; using closest non-terminal state"
            );
        }
        Ok(event)
    }

    fn check_unsigned(&self, provider_id: &ProviderId, signature_sent: bool) -> Result<()> {
        let reason = if signature_sent {
            "provider does not support webhook signatures"
        } else {
            "no signature sent"
        };
        match self.unsigned {
            UnsignedWebhookPolicy::Accept => {
                tracing::warn!(provider_id = %provider_id, reason, "processing unauthenticated webhook");
                Ok(())
            }
            UnsignedWebhookPolicy::Reject => Err(ShippingError::SignatureInvalid {
                provider_id: provider_id.clone(),
                reason: format!("{reason}; rejected by policy"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::models::shipment::ShipmentStatus;
    use crate::provider::ProviderCredentials;
    use crate::provider::ShippingProvider;
    use crate::registry::ProviderSettings;
    use crate::simulator::config::get_profile;
    use crate::simulator::SimulatedCarrier;

    const PAYLOAD: &[u8] = br#"{
        "tracking_number": "SS0000000001",
        "status": "in_transit",
        "timestamp": "2024-03-02T08:30:00Z",
        "location": "Nagpur Hub",
        "extra_field": 42
    }"#;

    async fn normalizer(policy: UnsignedWebhookPolicy, secret: Option<&str>) -> (WebhookNormalizer, Arc<MemoryEventSink>) {
        let registry = Arc::new(ProviderRegistry::new());
        let carrier = SimulatedCarrier::new("swiftship", get_profile("swiftship").unwrap());
        if let Some(secret) = secret {
            let mut credentials = ProviderCredentials::new();
            credentials.insert("webhook_secret".to_string(), secret.to_string());
            carrier.initialize(&credentials).await.unwrap();
        }
        registry.register(Arc::new(carrier), ProviderSettings::new(1));
        let events = Arc::new(MemoryEventSink::new());
        (WebhookNormalizer::new(registry, events.clone(), policy), events)
    }

    fn swiftship() -> ProviderId {
        ProviderId::from("swiftship")
    }

    #[tokio::test]
    async fn test_same_payload_yields_same_event() {
        let (normalizer, events) = normalizer(UnsignedWebhookPolicy::Accept, Some("k")).await;
        let first = normalizer.ingest(&swiftship(), PAYLOAD, Some("k")).await.unwrap();
        let second = normalizer.ingest(&swiftship(), PAYLOAD, Some("k")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.dedup_key(), second.dedup_key());
        assert_eq!(first.status, ShipmentStatus::InTransit);
        assert_eq!(first.location.as_deref(), Some("Nagpur Hub"));
        assert_eq!(events.count(ShippingEventKind::WebhookIngested), 2);
    }

    #[tokio::test]
    async fn test_bad_signature_never_emits() {
        let (normalizer, events) = normalizer(UnsignedWebhookPolicy::Accept, Some("k")).await;
        let err = normalizer.ingest(&swiftship(), PAYLOAD, Some("forged")).await.unwrap_err();
        assert!(matches!(err, ShippingError::SignatureInvalid { .. }));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_unsigned_policy() {
        let (accepting, _) = normalizer(UnsignedWebhookPolicy::Accept, None).await;
        assert!(accepting.ingest(&swiftship(), PAYLOAD, None).await.is_ok());
        assert!(accepting.ingest(&swiftship(), PAYLOAD, Some("anything")).await.is_ok());

        let (rejecting, events) = normalizer(UnsignedWebhookPolicy::Reject, None).await;
        let err = rejecting.ingest(&swiftship(), PAYLOAD, None).await.unwrap_err();
        assert!(matches!(err, ShippingError::SignatureInvalid { .. }));
        assert!(err.is_security_relevant());
        assert!(err.to_string().ends_with("no signature sent; rejected by policy"));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider_and_bad_json() {
        let (normalizer, _) = normalizer(UnsignedWebhookPolicy::Accept, None).await;
        assert!(matches!(
            normalizer.ingest(&ProviderId::from("ghost"), PAYLOAD, None).await,
            Err(ShippingError::UnknownProvider(_))
        ));
        assert!(matches!(
            normalizer.ingest(&swiftship(), b"not json", None).await,
            Err(ShippingError::InvalidPayload { .. })
        ));
        assert!(matches!(
            normalizer.ingest(&swiftship(), br#"{"status": "delivered"}"#, None).await,
            Err(ShippingError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_unmapped_status_becomes_non_terminal() {
        let (normalizer, _) = normalizer(UnsignedWebhookPolicy::Accept, None).await;
        let payload = br#"{"tracking_number": "SS1", "status": "shipment reached destination hub", "timestamp": "2024-03-02T08:30:00Z"}"#;
        let event = normalizer.ingest(&swiftship(), payload, None).await.unwrap();
        assert!(!event.status.is_terminal());
        assert_eq!(event.provider_status, "shipment reached destination hub");
    }
}
