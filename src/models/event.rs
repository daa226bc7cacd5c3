use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;

/// Audit points emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingEventKind {
    ProviderTried,
    ProviderFailed,
    ShipmentCreated,
    ShipmentCancelled,
    WebhookIngested,
}

impl std::fmt::Display for ShippingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShippingEventKind::ProviderTried => write!(f, "provider_tried"),
            ShippingEventKind::ProviderFailed => write!(f, "provider_failed"),
            ShippingEventKind::ShipmentCreated => write!(f, "shipment_created"),
            ShippingEventKind::ShipmentCancelled => write!(f, "shipment_cancelled"),
            ShippingEventKind::WebhookIngested => write!(f, "webhook_ingested"),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingEvent {
    pub kind: ShippingEventKind,
    pub provider_id: ProviderId,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    /// Kind-specific details (failure reason, attempt number, status...).
    pub detail: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl ShippingEvent {
    pub fn new(kind: ShippingEventKind, provider_id: ProviderId) -> Self {
        ShippingEvent {
            kind,
            provider_id,
            order_id: None,
            tracking_number: None,
            detail: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    pub fn order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn tracking(mut self, tracking_number: &str) -> Self {
        self.tracking_number = Some(tracking_number.to_string());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
