/// Shiprocket carrier-aggregator adapter.
///
/// Token login (tokens live ten days, refreshed a day early), courier
/// serviceability for rates, adhoc order + AWB assignment for shipments,
/// AWB tracking and cancellation. Webhooks are authenticated by the static
/// `x-api-key` token configured in the Shiprocket panel.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tokio::time::Duration;

use super::status_map::StatusMap;
use super::token::TokenManager;
use super::{ProviderCredentials, ShippingProvider};
use crate::error::{Result, ShippingError};
use crate::models::provider::{ProviderId, ProviderIdentity};
use crate::models::rate::{
    RateCharges, RateConstraints, RateFeatures, RatePerformance, RateRequest, ShippingMode,
    ShippingRate,
};
use crate::models::shipment::{
    CreateShipmentInput, PaymentMethod, Shipment, ShipmentStatus, TrackingEvent, TrackingInfo,
};
use crate::models::webhook::WebhookEvent;

pub const DEFAULT_BASE_URL: &str = "https://apiv2.shiprocket.in/v1/external";
const TRACKING_URL_PREFIX: &str = "https://shiprocket.co/tracking/";
const TOKEN_TTL: Duration = Duration::from_secs(10 * 24 * 3600);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(24 * 3600);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Shiprocket reports timestamps in IST.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Shiprocket status labels, as sent in webhooks and tracking activities.
pub const SHIPROCKET_STATUSES: StatusMap = StatusMap::new(&[
    ("NEW", ShipmentStatus::Pending),
    ("AWB ASSIGNED", ShipmentStatus::Created),
    ("LABEL GENERATED", ShipmentStatus::Created),
    ("PICKUP SCHEDULED", ShipmentStatus::Created),
    ("PICKUP GENERATED", ShipmentStatus::Created),
    ("PICKUP QUEUED", ShipmentStatus::Created),
    ("MANIFEST GENERATED", ShipmentStatus::Created),
    ("OUT FOR PICKUP", ShipmentStatus::Created),
    ("PICKUP EXCEPTION", ShipmentStatus::Created),
    ("PICKED UP", ShipmentStatus::PickedUp),
    ("SHIPPED", ShipmentStatus::InTransit),
    ("IN TRANSIT", ShipmentStatus::InTransit),
    ("REACHED AT DESTINATION HUB", ShipmentStatus::InTransit),
    ("MISROUTED", ShipmentStatus::InTransit),
    ("DELAYED", ShipmentStatus::InTransit),
    ("RTO INITIATED", ShipmentStatus::InTransit),
    ("RTO IN TRANSIT", ShipmentStatus::InTransit),
    ("OUT FOR DELIVERY", ShipmentStatus::OutForDelivery),
    ("UNDELIVERED", ShipmentStatus::OutForDelivery),
    ("DELIVERED", ShipmentStatus::Delivered),
    ("RTO DELIVERED", ShipmentStatus::Returned),
    ("CANCELED", ShipmentStatus::Cancelled),
    ("CANCELLED", ShipmentStatus::Cancelled),
    ("LOST", ShipmentStatus::Failed),
    ("DAMAGED", ShipmentStatus::Failed),
    ("DESTROYED", ShipmentStatus::Failed),
    ("DISPOSED OFF", ShipmentStatus::Failed),
]);

#[derive(Debug, Clone)]
struct Credentials {
    email: String,
    password: String,
    webhook_token: Option<String>,
    pickup_location: String,
}

/// Shiprocket adapter. One instance per configured account.
pub struct ShiprocketProvider {
    id: ProviderId,
    base_url: String,
    client: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
    tokens: TokenManager,
}

impl ShiprocketProvider {
    pub fn new(id: ProviderId) -> Result<Self> {
        Self::with_base_url(id, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(id: ProviderId, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ShippingError::Config(format!("http client for {id}: {e}")))?;
        Ok(ShiprocketProvider {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials: RwLock::new(None),
            tokens: TokenManager::new(TOKEN_REFRESH_MARGIN),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn credentials(&self) -> Result<Credentials> {
        self.credentials
            .read()
            .await
            .clone()
            .ok_or_else(|| ShippingError::auth(&self.id, "adapter used before initialize"))
    }

    async fn login(&self, credentials: &Credentials) -> Result<(String, Duration)> {
        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&json!({ "email": credentials.email, "password": credentials.password }))
            .send()
            .await
            .map_err(|e| ShippingError::auth(&self.id, format!("login transport: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShippingError::auth(
                &self.id,
                format!("login rejected with {status}"),
            ));
        }
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ShippingError::auth(&self.id, format!("login response: {e}")))?;
        Ok((body.token, TOKEN_TTL))
    }

    async fn token(&self) -> Result<String> {
        let credentials = self.credentials().await?;
        self.tokens
            .get_or_refresh(|| self.login(&credentials))
            .await
    }

    /// Sends an authenticated request and decodes the JSON body.
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let token = self.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ShippingError::request(&self.id, format!("transport: {e}")))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token revoked or expired early; the next call logs in again.
            self.tokens.clear().await;
            return Err(ShippingError::request(&self.id, "token rejected (401)"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(ShippingError::request(
                &self.id,
                format!("{status}: {snippet}"),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| ShippingError::payload(&self.id, format!("response decode: {e}")))
    }
}

#[async_trait]
impl ShippingProvider for ShiprocketProvider {
    fn identify(&self) -> ProviderIdentity {
        ProviderIdentity {
            id: self.id.clone(),
            name: "Shiprocket".to_string(),
        }
    }

    async fn initialize(&self, credentials: &ProviderCredentials) -> Result<()> {
        let field = |name: &str| {
            credentials
                .get(name)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| ShippingError::auth(&self.id, format!("missing credential '{name}'")))
        };
        let parsed = Credentials {
            email: field("email")?,
            password: field("password")?,
            webhook_token: credentials.get("webhook_token").cloned(),
            pickup_location: credentials
                .get("pickup_location")
                .cloned()
                .unwrap_or_else(|| "Primary".to_string()),
        };
        if self.tokens.current().await.is_some() {
            let unchanged = self
                .credentials
                .read()
                .await
                .as_ref()
                .map(|c| c.email == parsed.email && c.password == parsed.password)
                .unwrap_or(false);
            if unchanged {
                return Ok(());
            }
        }
        let (token, ttl) = self.login(&parsed).await?;
        self.tokens.store(token, ttl).await;
        *self.credentials.write().await = Some(parsed);
        tracing::info!(provider_id = %self.id, "shiprocket session established");
        Ok(())
    }

    async fn get_rates(&self, request: &RateRequest) -> Result<Vec<ShippingRate>> {
        let mut query = vec![
            ("pickup_postcode", request.from_pincode.trim().to_string()),
            ("delivery_postcode", request.to_pincode.trim().to_string()),
            ("weight", format!("{:.2}", request.weight_kg)),
            ("cod", if request.is_cod() { "1" } else { "0" }.to_string()),
        ];
        if let Some(value) = request.declared_value {
            query.push(("declared_value", format!("{value:.2}")));
        }
        let response: ServiceabilityResponse = self
            .send(self.client.get(self.url("courier/serviceability/")).query(&query))
            .await?;
        Ok(rates_from_serviceability(&self.identify(), response, &request.mode))
    }

    async fn create_shipment(&self, input: &CreateShipmentInput) -> Result<Shipment> {
        let credentials = self.credentials().await?;
        let body = adhoc_order_body(input, &credentials.pickup_location);
        let order: AdhocOrderResponse = self
            .send(self.client.post(self.url("orders/create/adhoc")).json(&body))
            .await?;
        let shipment_id = order.shipment_id.ok_or_else(|| {
            ShippingError::request(
                &self.id,
                format!(
                    "order {} created without shipment id: {}",
                    input.order.order_id,
                    order.message.unwrap_or_default()
                ),
            )
        })?;

        let mut assign = json!({ "shipment_id": shipment_id });
        if let Some(courier) = &input.courier_code {
            assign["courier_id"] = json!(courier);
        }
        let awb: AssignAwbResponse = self
            .send(self.client.post(self.url("courier/assign/awb")).json(&assign))
            .await?;
        let data = awb
            .response
            .map(|r| r.data)
            .filter(|d| awb.awb_assign_status == 1 && !d.awb_code.is_empty())
            .ok_or_else(|| {
                tracing::warn!(
                    provider_id = %self.id,
                    shipment_id,
                    "order created but awb assignment failed"
                );
                ShippingError::request(&self.id, format!("awb assignment failed for shipment {shipment_id}"))
            })?;

        Ok(Shipment {
            order_id: input.order.order_id.clone(),
            provider_id: self.id.clone(),
            provider_shipment_id: Some(shipment_id.to_string()),
            tracking_url: Some(format!("{TRACKING_URL_PREFIX}{}", data.awb_code)),
            tracking_number: data.awb_code,
            courier_name: data.courier_name,
            shipping_cost: data.freight_charges.unwrap_or(0.0),
            estimated_delivery: None,
            status: ShipmentStatus::Created,
            created_at: Utc::now(),
        })
    }

    async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingInfo> {
        let response: TrackResponse = self
            .send(self.client.get(self.url(&format!("courier/track/awb/{tracking_number}"))))
            .await?;
        tracking_info(&self.id, tracking_number, response.tracking_data)
    }

    async fn cancel_shipment(&self, tracking_number: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send(
                self.client
                    .post(self.url("orders/cancel/shipment/awbs"))
                    .json(&json!({ "awbs": [tracking_number] })),
            )
            .await?;
        Ok(())
    }

    fn handle_webhook(&self, payload: &serde_json::Value) -> Result<WebhookEvent> {
        parse_webhook(&self.id, payload)
    }

    fn validate_webhook(&self, _raw_payload: &[u8], signature: &str) -> Option<bool> {
        // try_read never blocks; the credentials are written only by initialize.
        let Ok(guard) = self.credentials.try_read() else {
            return Some(false);
        };
        let expected = guard.as_ref()?.webhook_token.as_deref()?;
        Some(bool::from(expected.as_bytes().ct_eq(signature.trim().as_bytes())))
    }

    fn map_status(&self, provider_status: &str) -> Option<ShipmentStatus> {
        SHIPROCKET_STATUSES.lookup(provider_status)
    }
}

// ---------------------------------------------------------------------------
// Wire types. Shiprocket mixes numbers and numeric strings freely.
// ---------------------------------------------------------------------------

fn flexible_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn flexible_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityResponse {
    #[serde(default)]
    data: Option<ServiceabilityData>,
}

#[derive(Debug, Deserialize)]
struct ServiceabilityData {
    #[serde(default)]
    available_courier_companies: Vec<CourierCompany>,
}

#[derive(Debug, Deserialize)]
struct CourierCompany {
    #[serde(deserialize_with = "flexible_string")]
    courier_company_id: String,
    courier_name: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    rate: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    freight_charge: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    cod_charges: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    estimated_delivery_days: Option<f64>,
    #[serde(default)]
    is_surface: bool,
    #[serde(default)]
    cod: i64,
    #[serde(default)]
    blocked: i64,
    #[serde(default, deserialize_with = "flexible_f64")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    delivery_performance: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pickup_performance: Option<f64>,
    #[serde(default, deserialize_with = "flexible_f64")]
    min_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AdhocOrderResponse {
    #[serde(default)]
    shipment_id: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignAwbResponse {
    #[serde(default)]
    awb_assign_status: i64,
    #[serde(default)]
    response: Option<AssignAwbEnvelope>,
}

#[derive(Debug, Deserialize)]
struct AssignAwbEnvelope {
    data: AssignAwbData,
}

#[derive(Debug, Deserialize)]
struct AssignAwbData {
    #[serde(default, deserialize_with = "flexible_string")]
    awb_code: String,
    #[serde(default)]
    courier_name: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    freight_charges: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    tracking_data: TrackingData,
}

#[derive(Debug, Deserialize)]
struct TrackingData {
    #[serde(default)]
    shipment_track: Vec<ShipmentTrack>,
    #[serde(default)]
    shipment_track_activities: Option<Vec<TrackActivity>>,
    #[serde(default)]
    track_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShipmentTrack {
    #[serde(default)]
    current_status: Option<String>,
    #[serde(default)]
    edd: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackActivity {
    #[serde(default)]
    date: String,
    #[serde(default)]
    activity: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, rename = "sr-status-label")]
    status_label: Option<String>,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

fn mode_matches(requested: &ShippingMode, is_surface: bool) -> bool {
    match requested {
        ShippingMode::Surface => is_surface,
        ShippingMode::Air => !is_surface,
        ShippingMode::Other(_) => true,
    }
}

fn rates_from_serviceability(
    identity: &ProviderIdentity,
    response: ServiceabilityResponse,
    requested_mode: &ShippingMode,
) -> Vec<ShippingRate> {
    let couriers = response
        .data
        .map(|d| d.available_courier_companies)
        .unwrap_or_default();
    couriers
        .into_iter()
        .filter(|c| mode_matches(requested_mode, c.is_surface))
        .filter_map(|c| {
            let freight = c.freight_charge.unwrap_or(0.0);
            let cod = c.cod_charges.unwrap_or(0.0);
            let rate = c.rate.unwrap_or(freight + cod);
            if !rate.is_finite() || rate < 0.0 {
                return None;
            }
            Some(ShippingRate {
                provider_id: identity.id.clone(),
                provider_name: identity.name.clone(),
                courier_name: c.courier_name,
                courier_code: c.courier_company_id,
                rate,
                estimated_days: c.estimated_delivery_days.map(|d| d.max(0.0).ceil() as u32).unwrap_or(0),
                mode: if c.is_surface { ShippingMode::Surface } else { ShippingMode::Air },
                available: c.blocked == 0,
                features: Some(RateFeatures {
                    cod: c.cod == 1,
                    tracking: true,
                    insurance: false,
                }),
                performance: Some(RatePerformance {
                    rating: c.rating,
                    delivery_performance: c.delivery_performance,
                    pickup_performance: c.pickup_performance,
                }),
                constraints: Some(RateConstraints {
                    min_weight_kg: c.min_weight,
                    max_weight_kg: None,
                    cod_limit: None,
                }),
                charges: Some(RateCharges {
                    freight,
                    cod,
                    other: (rate - freight - cod).max(0.0),
                }),
            })
        })
        .collect()
}

fn adhoc_order_body(input: &CreateShipmentInput, pickup_location: &str) -> serde_json::Value {
    let order = &input.order;
    let (payment_method, sub_total) = match order.payment {
        PaymentMethod::Prepaid => ("Prepaid", order.declared_value),
        PaymentMethod::Cod { amount } => ("COD", amount),
    };
    let items: Vec<_> = order
        .items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "sku": item.sku,
                "units": item.units,
                "selling_price": item.unit_price,
            })
        })
        .collect();
    json!({
        "order_id": order.order_id,
        "order_date": order.order_date.format("%Y-%m-%d").to_string(),
        "pickup_location": pickup_location,
        "billing_customer_name": order.delivery.name,
        "billing_last_name": "",
        "billing_address": order.delivery.line1,
        "billing_address_2": order.delivery.line2.clone().unwrap_or_default(),
        "billing_city": order.delivery.city,
        "billing_pincode": order.delivery.pincode,
        "billing_state": order.delivery.state,
        "billing_country": order.delivery.country,
        "billing_email": order.delivery.email.clone().unwrap_or_default(),
        "billing_phone": order.delivery.phone,
        "shipping_is_billing": true,
        "order_items": items,
        "payment_method": payment_method,
        "sub_total": sub_total,
        "length": order.package.length_cm,
        "breadth": order.package.breadth_cm,
        "height": order.package.height_cm,
        "weight": order.package.weight_kg,
    })
}

/// Parses Shiprocket timestamps ("23 05 2023 11:43:52" or "2023-05-23 11:43:52"), IST.
fn parse_ist_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = ["%d %m %Y %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d-%m-%Y %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
    let ist = chrono::FixedOffset::east_opt(IST_OFFSET_SECS)?;
    ist.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_edd(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d-%m-%Y"))
        .ok()
}

fn tracking_info(id: &ProviderId, tracking_number: &str, data: TrackingData) -> Result<TrackingInfo> {
    if let Some(error) = data.error.filter(|e| !e.is_empty()) {
        return Err(ShippingError::request(id, format!("tracking {tracking_number}: {error}")));
    }
    let mut events: Vec<TrackingEvent> = data
        .shipment_track_activities
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| {
            let label = a.status_label.or(a.activity.clone()).unwrap_or_default();
            Some(TrackingEvent {
                status: SHIPROCKET_STATUSES.resolve(&label),
                provider_status: label,
                location: a.location.filter(|l| !l.is_empty()),
                timestamp: parse_ist_timestamp(&a.date)?,
                description: a.activity,
            })
        })
        .collect();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let track = data.shipment_track.into_iter().next();
    let status = track
        .as_ref()
        .and_then(|t| t.current_status.as_deref())
        .map(|label| SHIPROCKET_STATUSES.resolve(label))
        .or_else(|| events.first().map(|e| e.status))
        .unwrap_or(ShipmentStatus::Created);
    Ok(TrackingInfo {
        provider_id: id.clone(),
        tracking_number: tracking_number.to_string(),
        status,
        tracking_url: data.track_url,
        estimated_delivery: track.and_then(|t| t.edd).as_deref().and_then(parse_edd),
        events,
    })
}

fn parse_webhook(id: &ProviderId, payload: &serde_json::Value) -> Result<WebhookEvent> {
    let object = payload
        .as_object()
        .ok_or_else(|| ShippingError::payload(id, "webhook body is not a JSON object"))?;
    let text = |key: &str| -> Option<String> {
        match object.get(key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    let tracking_number = text("awb").ok_or_else(|| ShippingError::payload(id, "missing awb"))?;
    let provider_status = text("current_status")
        .or_else(|| text("shipment_status"))
        .ok_or_else(|| ShippingError::payload(id, "missing current_status"))?;

    let scans: Vec<TrackActivity> = object
        .get("scans")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let last_scan = scans.last();

    let timestamp = text("current_timestamp")
        .as_deref()
        .and_then(parse_ist_timestamp)
        .or_else(|| last_scan.and_then(|s| parse_ist_timestamp(&s.date)))
        .ok_or_else(|| ShippingError::payload(id, "missing or unparseable current_timestamp"))?;

    Ok(WebhookEvent {
        provider_id: id.clone(),
        tracking_number,
        status: SHIPROCKET_STATUSES.resolve(&provider_status),
        provider_status,
        location: last_scan.and_then(|s| s.location.clone()).filter(|l| !l.is_empty()),
        timestamp,
        description: last_scan.and_then(|s| s.activity.clone()),
        raw_provider_payload: payload.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn identity() -> ProviderIdentity {
        ProviderIdentity {
            id: ProviderId::from("shiprocket_main"),
            name: "Shiprocket".to_string(),
        }
    }

    fn serviceability() -> ServiceabilityResponse {
        serde_json::from_value(json!({
            "status": 200,
            "data": {
                "available_courier_companies": [
                    {
                        "courier_company_id": 10,
                        "courier_name": "Delhivery Surface",
                        "rate": 92.5,
                        "freight_charge": 92.5,
                        "cod_charges": 0,
                        "estimated_delivery_days": "5",
                        "is_surface": true,
                        "cod": 1,
                        "rating": 4.1,
                        "unknown_field": {"ignored": true}
                    },
                    {
                        "courier_company_id": "24",
                        "courier_name": "Blue Dart Air",
                        "rate": "180.00",
                        "estimated_delivery_days": 2,
                        "is_surface": false,
                        "blocked": 1
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_serviceability_filters_by_mode() {
        let surface = rates_from_serviceability(&identity(), serviceability(), &ShippingMode::Surface);
        assert_eq!(surface.len(), 1);
        let rate = &surface[0];
        assert_eq!(rate.courier_code, "10");
        assert_eq!(rate.rate, 92.5);
        assert_eq!(rate.estimated_days, 5);
        assert!(rate.available);
        assert_eq!(rate.features.as_ref().map(|f| f.cod), Some(true));
    }

    #[test]
    fn test_blocked_courier_is_unavailable() {
        let air = rates_from_serviceability(&identity(), serviceability(), &ShippingMode::Air);
        assert_eq!(air.len(), 1);
        assert_eq!(air[0].rate, 180.0);
        assert!(!air[0].available);
    }

    #[test]
    fn test_webhook_parsing_is_pure_and_ignores_unknowns() {
        let payload = json!({
            "awb": 19041424751540u64,
            "courier_name": "Delhivery Surface",
            "current_status": "IN TRANSIT",
            "current_timestamp": "23 05 2023 11:43:52",
            "some_new_field": [1, 2, 3],
            "scans": [
                {"date": "2023-05-23 10:00:00", "activity": "Picked", "location": "Delhi", "sr-status-label": "PICKED UP"},
                {"date": "2023-05-23 11:43:52", "activity": "Bag Added", "location": "Gurgaon Hub", "sr-status-label": "IN TRANSIT"}
            ]
        });
        let id = identity().id;
        let first = parse_webhook(&id, &payload).unwrap();
        let second = parse_webhook(&id, &payload).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.tracking_number, "19041424751540");
        assert_eq!(first.status, ShipmentStatus::InTransit);
        assert_eq!(first.location.as_deref(), Some("Gurgaon Hub"));
        // 11:43:52 IST is 06:13:52 UTC.
        assert_eq!(first.timestamp.hour(), 6);
        assert_eq!(first.timestamp.minute(), 13);
    }

    #[test]
    fn test_webhook_without_awb_is_invalid() {
        let err = parse_webhook(&identity().id, &json!({"current_status": "DELIVERED"})).unwrap_err();
        assert!(matches!(err, ShippingError::InvalidPayload { .. }));
        let err = parse_webhook(&identity().id, &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ShippingError::InvalidPayload { .. }));
    }

    #[test]
    fn test_status_table() {
        assert_eq!(SHIPROCKET_STATUSES.lookup("RTO DELIVERED"), Some(ShipmentStatus::Returned));
        assert_eq!(SHIPROCKET_STATUSES.lookup("canceled"), Some(ShipmentStatus::Cancelled));
        assert_eq!(SHIPROCKET_STATUSES.lookup("Out For Delivery"), Some(ShipmentStatus::OutForDelivery));
        assert_eq!(SHIPROCKET_STATUSES.lookup("PARTIAL_DELIVERED"), None);
    }

    #[test]
    fn test_tracking_orders_events_newest_first() {
        let data: TrackingData = serde_json::from_value(json!({
            "shipment_track": [{"current_status": "Out For Delivery", "edd": "2023-05-25 00:00:00"}],
            "shipment_track_activities": [
                {"date": "2023-05-23 10:00:00", "activity": "Picked", "location": "Delhi", "sr-status-label": "PICKED UP"},
                {"date": "2023-05-24 09:00:00", "activity": "Out for delivery", "location": "Mumbai", "sr-status-label": "OUT FOR DELIVERY"}
            ],
            "track_url": "https://shiprocket.co/tracking/123"
        }))
        .unwrap();
        let info = tracking_info(&identity().id, "123", data).unwrap();
        assert_eq!(info.status, ShipmentStatus::OutForDelivery);
        assert_eq!(info.events[0].status, ShipmentStatus::OutForDelivery);
        assert_eq!(info.estimated_delivery, NaiveDate::from_ymd_opt(2023, 5, 25));
    }

    #[tokio::test]
    async fn test_validate_webhook_requires_configured_token() {
        let provider = ShiprocketProvider::new(identity().id).unwrap();
        assert_eq!(provider.validate_webhook(b"{}", "secret"), None);
        *provider.credentials.write().await = Some(Credentials {
            email: "ops@example.com".to_string(),
            password: "pw".to_string(),
            webhook_token: Some("secret".to_string()),
            pickup_location: "Primary".to_string(),
        });
        assert_eq!(provider.validate_webhook(b"{}", "secret"), Some(true));
        assert_eq!(provider.validate_webhook(b"{}", "wrong"), Some(false));
    }

    #[tokio::test]
    async fn test_initialize_rejects_missing_credentials() {
        let provider = ShiprocketProvider::new(identity().id).unwrap();
        let err = provider.initialize(&ProviderCredentials::new()).await.unwrap_err();
        assert!(matches!(err, ShippingError::ProviderAuth { .. }));
    }
}
