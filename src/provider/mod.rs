/// Provider adapters: the capability contract every carrier integration
/// implements, plus shared helpers.
///
/// Adapters are stateless per call apart from their initialized session,
/// which is read-only after `initialize` and safe to share across requests.

pub mod shiprocket;
pub mod status_map;
pub mod token;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::provider::ProviderIdentity;
use crate::models::rate::{RateRequest, ShippingRate};
use crate::models::shipment::{CreateShipmentInput, Shipment, ShipmentStatus, TrackingInfo};
use crate::models::webhook::WebhookEvent;

/// Credentials handed to `initialize`, straight from the provider record.
pub type ProviderCredentials = HashMap<String, String>;

/// Capability contract for one carrier integration.
///
/// Network operations may suspend. The caller bounds each with a timeout, so
/// adapters do not need their own deadline handling beyond a sane client timeout.
#[async_trait]
pub trait ShippingProvider: Send + Sync {
    /// Id and display name. Pure, no I/O.
    fn identify(&self) -> ProviderIdentity;

    /// Establishes credentials/session. Idempotent.
    ///
    /// Fails with `ShippingError::ProviderAuth` on bad credentials.
    async fn initialize(&self, credentials: &ProviderCredentials) -> Result<()>;

    /// Quotes every courier this provider offers for the request. An empty
    /// list means "not serviceable through this provider".
    async fn get_rates(&self, request: &RateRequest) -> Result<Vec<ShippingRate>>;

    /// Books a shipment. Side-effecting: called at most once per logical attempt.
    async fn create_shipment(&self, input: &CreateShipmentInput) -> Result<Shipment>;

    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingInfo>;

    async fn cancel_shipment(&self, tracking_number: &str) -> Result<()>;

    /// Parses a provider webhook into the canonical event. Unknown fields are
    /// ignored; only structurally invalid payloads are rejected.
    fn handle_webhook(&self, payload: &serde_json::Value) -> Result<WebhookEvent>;

    /// Checks a webhook signature. `None` means this provider does not sign
    /// its webhooks.
    fn validate_webhook(&self, _raw_payload: &[u8], _signature: &str) -> Option<bool> {
        None
    }

    /// Adapter-owned lookup from the provider's status vocabulary.
    fn map_status(&self, provider_status: &str) -> Option<ShipmentStatus>;
}
