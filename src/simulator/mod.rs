/// Carrier Simulator: a deterministic in-process provider adapter.
///
/// Quotes are computed from pincode zones and the carrier profile, so the
/// same request always yields the same rates. Failures and latency can be
/// injected at runtime, and every network-style call is counted, which makes
/// the simulator the workhorse of the engine's tests, the demo CLI and the
/// default serverless configuration.

pub mod config;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use subtle::ConstantTimeEq;
use tokio::time::Duration;

use crate::error::{Result, ShippingError};
use crate::models::provider::{ProviderId, ProviderIdentity};
use crate::models::rate::{
    RateCharges, RateFeatures, RatePerformance, RateRequest, ShippingMode, ShippingRate,
};
use crate::models::shipment::{
    CreateShipmentInput, Shipment, ShipmentStatus, TrackingEvent, TrackingInfo,
};
use crate::models::webhook::WebhookEvent;
use crate::provider::status_map::StatusMap;
use crate::provider::{ProviderCredentials, ShippingProvider};
use config::{CarrierProfile, CourierProfile};

/// Status vocabulary used by simulated webhooks.
pub const SIMULATED_STATUSES: StatusMap = StatusMap::new(&[
    ("pending", ShipmentStatus::Pending),
    ("booked", ShipmentStatus::Created),
    ("picked_up", ShipmentStatus::PickedUp),
    ("in_transit", ShipmentStatus::InTransit),
    ("out_for_delivery", ShipmentStatus::OutForDelivery),
    ("delivered", ShipmentStatus::Delivered),
    ("lost", ShipmentStatus::Failed),
    ("rto_delivered", ShipmentStatus::Returned),
    ("cancelled", ShipmentStatus::Cancelled),
]);

/// Injected failure behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FailureMode {
    #[default]
    None,
    /// `get_rates` fails with the given reason.
    Rates(String),
    /// `get_rates` succeeds with an empty list.
    NoRates,
    /// `create_shipment` fails with the given reason.
    Shipments(String),
    /// `initialize` rejects the credentials.
    Auth,
}

#[derive(Debug, Clone)]
struct SimulatedShipment {
    status: ShipmentStatus,
    created_at: DateTime<Utc>,
}

/// Simulated provider adapter backed by a `CarrierProfile`.
pub struct SimulatedCarrier {
    id: ProviderId,
    profile: CarrierProfile,
    failure: Mutex<FailureMode>,
    latency: Mutex<Duration>,
    webhook_secret: Mutex<Option<String>>,
    shipments: Mutex<HashMap<String, SimulatedShipment>>,
    awb_counter: AtomicU64,
    rate_calls: AtomicUsize,
    shipment_calls: AtomicUsize,
}

/// Locks a mutex, recovering the data if a panicking holder poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedCarrier {
    /// Creates a simulated adapter registered under `id`.
    pub fn new(id: impl Into<ProviderId>, profile: CarrierProfile) -> Self {
        SimulatedCarrier {
            id: id.into(),
            profile,
            failure: Mutex::new(FailureMode::None),
            latency: Mutex::new(Duration::ZERO),
            webhook_secret: Mutex::new(None),
            shipments: Mutex::new(HashMap::new()),
            awb_counter: AtomicU64::new(0),
            rate_calls: AtomicUsize::new(0),
            shipment_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_failure(self, failure: FailureMode) -> Self {
        self.set_failure(failure);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.latency) = latency;
        self
    }

    pub fn set_failure(&self, failure: FailureMode) {
        *lock(&self.failure) = failure;
    }

    /// Number of `get_rates` calls received.
    pub fn rate_calls(&self) -> usize {
        self.rate_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_shipment` calls received.
    pub fn shipment_calls(&self) -> usize {
        self.shipment_calls.load(Ordering::SeqCst)
    }

    fn failure(&self) -> FailureMode {
        lock(&self.failure).clone()
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity {
            id: self.id.clone(),
            name: self.profile.name.to_string(),
        }
    }

    fn serves(&self, pincode: &str) -> bool {
        !self
            .profile
            .unserviceable_prefixes
            .iter()
            .any(|prefix| pincode.starts_with(prefix))
    }

    fn quote(&self, courier: &CourierProfile, request: &RateRequest, zone: usize) -> ShippingRate {
        let slabs = (request.weight_kg / 0.5).ceil().max(1.0);
        let freight = (courier.base_charge + courier.per_slab * (slabs - 1.0))
            * self.profile.zone_multipliers[zone];
        let cod = match request.cod_amount {
            Some(amount) if amount > 0.0 => self
                .profile
                .cod_min_charge
                .max(amount * self.profile.cod_percentage / 100.0),
            _ => 0.0,
        };
        ShippingRate {
            provider_id: self.id.clone(),
            provider_name: self.profile.name.to_string(),
            courier_name: courier.name.to_string(),
            courier_code: courier.code.to_string(),
            rate: round_to_paise(freight + cod),
            estimated_days: courier.base_days + zone as u32,
            mode: courier.mode.clone(),
            available: !request.is_cod() || courier.cod,
            features: Some(RateFeatures {
                cod: courier.cod,
                tracking: true,
                insurance: matches!(courier.mode, ShippingMode::Air),
            }),
            performance: Some(RatePerformance {
                rating: Some(courier.rating),
                delivery_performance: None,
                pickup_performance: None,
            }),
            constraints: None,
            charges: Some(RateCharges {
                freight: round_to_paise(freight),
                cod: round_to_paise(cod),
                other: 0.0,
            }),
        }
    }

    fn mode_matches(requested: &ShippingMode, offered: &ShippingMode) -> bool {
        matches!(requested, ShippingMode::Other(_)) || requested == offered
    }
}

/// Zone between two pincodes: 0 local, 1 regional, 2 national, 3 remote.
///
/// Returns `None` for malformed pincodes (not six digits).
pub fn zone_between(from: &str, to: &str) -> Option<usize> {
    let valid = |p: &str| p.len() == 6 && p.chars().all(|c| c.is_ascii_digit());
    let (from, to) = (from.trim(), to.trim());
    if !valid(from) || !valid(to) {
        return None;
    }
    if from[..3] == to[..3] {
        return Some(0);
    }
    let region = |p: &str| p.as_bytes()[0] - b'0';
    let distance = region(from).abs_diff(region(to));
    Some(match distance {
        0 => 1,
        1..=3 => 2,
        _ => 3,
    })
}

fn round_to_paise(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[async_trait]
impl ShippingProvider for SimulatedCarrier {
    fn identify(&self) -> ProviderIdentity {
        self.identity()
    }

    async fn initialize(&self, credentials: &ProviderCredentials) -> Result<()> {
        if self.failure() == FailureMode::Auth {
            return Err(ShippingError::auth(&self.id, "simulated credential rejection"));
        }
        if let Some(secret) = credentials.get("webhook_secret") {
            *lock(&self.webhook_secret) = Some(secret.clone());
        }
        Ok(())
    }

    async fn get_rates(&self, request: &RateRequest) -> Result<Vec<ShippingRate>> {
        self.rate_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        match self.failure() {
            FailureMode::Rates(reason) => return Err(ShippingError::request(&self.id, reason)),
            FailureMode::NoRates => return Ok(Vec::new()),
            _ => {}
        }
        let Some(zone) = zone_between(&request.from_pincode, &request.to_pincode) else {
            return Err(ShippingError::request(
                &self.id,
                format!(
                    "invalid pincode pair {} -> {}",
                    request.from_pincode, request.to_pincode
                ),
            ));
        };
        if !self.serves(request.to_pincode.trim()) {
            return Ok(Vec::new());
        }
        Ok(self
            .profile
            .couriers
            .iter()
            .filter(|c| Self::mode_matches(&request.mode, &c.mode))
            .map(|c| self.quote(c, request, zone))
            .collect())
    }

    async fn create_shipment(&self, input: &CreateShipmentInput) -> Result<Shipment> {
        self.shipment_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if let FailureMode::Shipments(reason) = self.failure() {
            return Err(ShippingError::request(&self.id, reason));
        }
        let request = input.order.rate_request();
        let zone = zone_between(&request.from_pincode, &request.to_pincode).ok_or_else(|| {
            ShippingError::request(&self.id, "pickup or delivery pincode is not serviceable")
        })?;
        let courier = match &input.courier_code {
            Some(code) => self
                .profile
                .couriers
                .iter()
                .find(|c| c.code == code.as_str())
                .ok_or_else(|| ShippingError::request(&self.id, format!("unknown courier {code}")))?,
            None => self
                .profile
                .couriers
                .iter()
                .filter(|c| Self::mode_matches(&request.mode, &c.mode))
                .min_by(|a, b| a.base_charge.total_cmp(&b.base_charge))
                .ok_or_else(|| ShippingError::request(&self.id, "no courier for requested mode"))?,
        };
        let quote = self.quote(courier, &request, zone);
        let serial = self.awb_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let awb = format!("{}{:010}", self.profile.awb_prefix, serial);
        let created_at = Utc::now();
        lock(&self.shipments).insert(
            awb.clone(),
            SimulatedShipment {
                status: ShipmentStatus::Created,
                created_at,
            },
        );
        Ok(Shipment {
            order_id: input.order.order_id.clone(),
            provider_id: self.id.clone(),
            provider_shipment_id: Some(format!("{}-{serial}", self.profile.id)),
            tracking_url: Some(format!("{}{awb}", self.profile.tracking_url_base)),
            tracking_number: awb,
            courier_name: courier.name.to_string(),
            shipping_cost: quote.rate,
            estimated_delivery: input
                .order
                .order_date
                .checked_add_signed(ChronoDuration::days(i64::from(quote.estimated_days))),
            status: ShipmentStatus::Created,
            created_at,
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingInfo> {
        self.simulate_latency().await;
        let shipment = lock(&self.shipments)
            .get(tracking_number)
            .cloned()
            .ok_or_else(|| ShippingError::request(&self.id, format!("unknown awb {tracking_number}")))?;
        Ok(TrackingInfo {
            provider_id: self.id.clone(),
            tracking_number: tracking_number.to_string(),
            status: shipment.status,
            tracking_url: Some(format!("{}{tracking_number}", self.profile.tracking_url_base)),
            estimated_delivery: None,
            events: vec![TrackingEvent {
                status: shipment.status,
                provider_status: shipment.status.to_string(),
                location: None,
                timestamp: shipment.created_at,
                description: None,
            }],
        })
    }

    async fn cancel_shipment(&self, tracking_number: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut shipments = lock(&self.shipments);
        let shipment = shipments
            .get_mut(tracking_number)
            .ok_or_else(|| ShippingError::request(&self.id, format!("unknown awb {tracking_number}")))?;
        if !shipment.status.can_transition_to(ShipmentStatus::Cancelled) {
            return Err(ShippingError::request(
                &self.id,
                format!("awb {tracking_number} is already {}", shipment.status),
            ));
        }
        shipment.status = ShipmentStatus::Cancelled;
        Ok(())
    }

    fn handle_webhook(&self, payload: &serde_json::Value) -> Result<WebhookEvent> {
        let field = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let tracking_number = field("tracking_number")
            .ok_or_else(|| ShippingError::payload(&self.id, "missing tracking_number"))?;
        let provider_status =
            field("status").ok_or_else(|| ShippingError::payload(&self.id, "missing status"))?;
        let timestamp = field("timestamp")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| ShippingError::payload(&self.id, "missing or invalid timestamp"))?;
        Ok(WebhookEvent {
            provider_id: self.id.clone(),
            tracking_number,
            status: SIMULATED_STATUSES.resolve(&provider_status),
            provider_status,
            location: field("location"),
            timestamp,
            description: field("description"),
            raw_provider_payload: payload.clone(),
        })
    }

    fn validate_webhook(&self, _raw_payload: &[u8], signature: &str) -> Option<bool> {
        let secret = lock(&self.webhook_secret).clone()?;
        Some(bool::from(secret.as_bytes().ct_eq(signature.as_bytes())))
    }

    fn map_status(&self, provider_status: &str) -> Option<ShipmentStatus> {
        SIMULATED_STATUSES.lookup(provider_status)
    }
}
