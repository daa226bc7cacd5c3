use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use super::shipment::ShipmentStatus;

/// Canonical tracking event normalized from a provider webhook.
///
/// Built purely from the payload: the same payload always yields the same
/// event, so consumers can deduplicate on
/// `(provider_id, tracking_number, status, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider_id: ProviderId,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    /// The carrier's own status label, before mapping.
    pub provider_status: String,
    #[serde(default)]
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    /// Original payload, retained for audit.
    pub raw_provider_payload: serde_json::Value,
}

impl WebhookEvent {
    /// Deduplication key for at-least-once delivery.
    pub fn dedup_key(&self) -> (ProviderId, String, ShipmentStatus, DateTime<Utc>) {
        (
            self.provider_id.clone(),
            self.tracking_number.clone(),
            self.status,
            self.timestamp,
        )
    }
}
