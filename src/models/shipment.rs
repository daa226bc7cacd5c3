use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use super::rate::{RateRequest, ShippingMode};
use crate::error::{Result, ShippingError};

/// Canonical shipment status shared by every provider.
///
/// `Delivered`, `Failed`, `Returned` and `Cancelled` are terminal. The
/// non-terminal states form a forward progression in declaration order, but
/// carriers may skip steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Failed,
    Returned,
    Cancelled,
}

impl ShipmentStatus {
    /// Returns true if no further transition may leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered
                | ShipmentStatus::Failed
                | ShipmentStatus::Returned
                | ShipmentStatus::Cancelled
        )
    }

    /// Position in the forward progression. Terminal states share the last rank.
    fn rank(&self) -> u8 {
        match self {
            ShipmentStatus::Pending => 0,
            ShipmentStatus::Created => 1,
            ShipmentStatus::PickedUp => 2,
            ShipmentStatus::InTransit => 3,
            ShipmentStatus::OutForDelivery => 4,
            _ => 5,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Terminal states absorb everything. Non-terminal states may only move
    /// forward (skips allowed) or repeat.
    pub fn can_transition_to(&self, next: ShipmentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }

    /// Best-effort mapping of an unrecognized carrier label onto a
    /// non-terminal state. Never returns a terminal state.
    pub fn closest_non_terminal(label: &str) -> ShipmentStatus {
        let label = label.to_lowercase();
        if label.contains("out for") || label.contains("ofd") {
            ShipmentStatus::OutForDelivery
        } else if label.contains("transit")
            || label.contains("hub")
            || label.contains("reached")
            || label.contains("dispatch")
        {
            ShipmentStatus::InTransit
        } else if label.contains("picked") || label.contains("pickup complete") {
            ShipmentStatus::PickedUp
        } else if label.contains("manifest")
            || label.contains("awb")
            || label.contains("booked")
            || label.contains("pickup")
        {
            ShipmentStatus::Created
        } else if label.contains("new") || label.contains("pending") {
            ShipmentStatus::Pending
        } else {
            ShipmentStatus::InTransit
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShipmentStatus::Pending => write!(f, "pending"),
            ShipmentStatus::Created => write!(f, "created"),
            ShipmentStatus::PickedUp => write!(f, "picked_up"),
            ShipmentStatus::InTransit => write!(f, "in_transit"),
            ShipmentStatus::OutForDelivery => write!(f, "out_for_delivery"),
            ShipmentStatus::Delivered => write!(f, "delivered"),
            ShipmentStatus::Failed => write!(f, "failed"),
            ShipmentStatus::Returned => write!(f, "returned"),
            ShipmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Postal address for pickup or delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

/// Physical package description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub weight_kg: f64,
    pub length_cm: f64,
    pub breadth_cm: f64,
    pub height_cm: f64,
}

/// One line item on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub sku: String,
    pub units: u32,
    pub unit_price: f64,
}

/// How the consignee pays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentMethod {
    Prepaid,
    /// Cash on delivery; the courier collects `amount`.
    Cod { amount: f64 },
}

/// The order a shipment is created for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentOrder {
    pub order_id: String,
    pub order_date: NaiveDate,
    pub pickup: Address,
    pub delivery: Address,
    pub package: Package,
    pub items: Vec<OrderItem>,
    pub payment: PaymentMethod,
    pub declared_value: f64,
    #[serde(default)]
    pub mode: ShippingMode,
}

impl ShipmentOrder {
    pub fn validate(&self) -> Result<()> {
        if self.order_id.trim().is_empty() {
            return Err(ShippingError::InvalidRequest("order id is required".to_string()));
        }
        if self.items.is_empty() {
            return Err(ShippingError::InvalidRequest(format!(
                "order {} has no items",
                self.order_id
            )));
        }
        self.rate_request().validate()
    }

    /// Rate request describing this order's route and package.
    pub fn rate_request(&self) -> RateRequest {
        RateRequest {
            from_pincode: self.pickup.pincode.clone(),
            to_pincode: self.delivery.pincode.clone(),
            weight_kg: self.package.weight_kg,
            mode: self.mode.clone(),
            cod_amount: match self.payment {
                PaymentMethod::Cod { amount } => Some(amount),
                PaymentMethod::Prepaid => None,
            },
            declared_value: Some(self.declared_value),
        }
    }
}

/// Input to a single adapter's `create_shipment` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateShipmentInput {
    pub order: ShipmentOrder,
    /// Courier to book, when a rate was chosen for this provider.
    #[serde(default)]
    pub courier_code: Option<String>,
}

/// A successfully created shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub order_id: String,
    pub provider_id: ProviderId,
    /// Provider-side shipment reference, when distinct from the AWB.
    #[serde(default)]
    pub provider_shipment_id: Option<String>,
    pub tracking_number: String,
    pub tracking_url: Option<String>,
    pub courier_name: String,
    pub shipping_cost: f64,
    pub estimated_delivery: Option<NaiveDate>,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
}

/// One scan/activity on a tracked shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: ShipmentStatus,
    pub provider_status: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
}

/// Tracking snapshot for one shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub provider_id: ProviderId,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<NaiveDate>,
    /// Most recent first.
    pub events: Vec<TrackingEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ShipmentStatus; 9] = [
        ShipmentStatus::Pending,
        ShipmentStatus::Created,
        ShipmentStatus::PickedUp,
        ShipmentStatus::InTransit,
        ShipmentStatus::OutForDelivery,
        ShipmentStatus::Delivered,
        ShipmentStatus::Failed,
        ShipmentStatus::Returned,
        ShipmentStatus::Cancelled,
    ];

    #[test]
    fn test_terminal_states_absorb_every_transition() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_forward_skips_are_allowed() {
        assert!(ShipmentStatus::Created.can_transition_to(ShipmentStatus::InTransit));
        assert!(ShipmentStatus::Pending.can_transition_to(ShipmentStatus::Delivered));
        assert!(ShipmentStatus::InTransit.can_transition_to(ShipmentStatus::InTransit));
    }

    #[test]
    fn test_backward_moves_are_rejected() {
        assert!(!ShipmentStatus::OutForDelivery.can_transition_to(ShipmentStatus::PickedUp));
    }

    #[test]
    fn test_closest_non_terminal_never_invents_terminal() {
        for label in ["Delivered?", "RTO weird", "LOST-ish", "", "Reached Destination Hub"] {
            assert!(!ShipmentStatus::closest_non_terminal(label).is_terminal());
        }
        assert_eq!(
            ShipmentStatus::closest_non_terminal("Out For Delivery Attempt 2"),
            ShipmentStatus::OutForDelivery
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ShipmentStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out_for_delivery\"");
    }
}
