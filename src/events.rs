/// Audit event sinks.
///
/// The engine appends a `ShippingEvent` for every provider attempt, failure,
/// created or cancelled shipment, and ingested webhook. Sink failures are
/// logged by the caller and never fail the operation that emitted the event.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::event::{ShippingEvent, ShippingEventKind};

/// Append-only destination for audit events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(&self, event: ShippingEvent) -> Result<()>;
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn append(&self, event: ShippingEvent) -> Result<()> {
        tracing::info!(
            target: "shipping::audit",
            kind = %event.kind,
            provider_id = %event.provider_id,
            order_id = event.order_id.as_deref().unwrap_or(""),
            tracking_number = event.tracking_number.as_deref().unwrap_or(""),
            detail = %event.detail,
            "shipping event"
        );
        Ok(())
    }
}

/// Keeps events in memory. Used by tests and the report generator.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ShippingEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ShippingEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, kind: ShippingEventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn append(&self, event: ShippingEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::provider::ProviderId;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryEventSink::new();
        sink.append(ShippingEvent::new(ShippingEventKind::ProviderTried, ProviderId::from("a")))
            .await
            .unwrap();
        sink.append(
            ShippingEvent::new(ShippingEventKind::ProviderFailed, ProviderId::from("a"))
                .order("ORD-1")
                .detail(json!({ "reason": "timeout" })),
        )
        .await
        .unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].order_id.as_deref(), Some("ORD-1"));
        assert_eq!(sink.count(ShippingEventKind::ProviderFailed), 1);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let event = ShippingEvent::new(ShippingEventKind::WebhookIngested, ProviderId::from("b"))
            .tracking("AWB1");
        assert!(TracingEventSink.append(event).await.is_ok());
    }
}
