use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use crate::error::{ProviderFailure, Result, ShippingError};

/// Transport mode for a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMode {
    #[default]
    Surface,
    Air,
    /// Carrier-specific mode not modelled explicitly (e.g. "express").
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for ShippingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShippingMode::Surface => write!(f, "surface"),
            ShippingMode::Air => write!(f, "air"),
            ShippingMode::Other(mode) => write!(f, "{}", mode.to_lowercase()),
        }
    }
}

/// Optional service features advertised with a rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateFeatures {
    pub cod: bool,
    pub tracking: bool,
    pub insurance: bool,
}

/// Courier performance scores reported by the aggregator (0.0–5.0 scale).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatePerformance {
    pub rating: Option<f64>,
    pub delivery_performance: Option<f64>,
    pub pickup_performance: Option<f64>,
}

/// Limits the courier applies to this quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateConstraints {
    pub min_weight_kg: Option<f64>,
    pub max_weight_kg: Option<f64>,
    pub cod_limit: Option<f64>,
}

/// Breakdown of the quoted amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCharges {
    pub freight: f64,
    pub cod: f64,
    pub other: f64,
}

/// A quoted offer from one courier through one provider.
///
/// Identity for deduplication and selection is `(provider_id, courier_code)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub courier_name: String,
    pub courier_code: String,
    /// Total quoted amount, never negative.
    pub rate: f64,
    pub estimated_days: u32,
    pub mode: ShippingMode,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<RateFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<RatePerformance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<RateConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charges: Option<RateCharges>,
}

/// A rate quote request. Also the basis of the rate cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRequest {
    pub from_pincode: String,
    pub to_pincode: String,
    /// Package weight in kilograms, must be positive.
    pub weight_kg: f64,
    #[serde(default)]
    pub mode: ShippingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cod_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<f64>,
}

/// Weight is rounded up to this many kilograms when building cache keys.
const WEIGHT_KEY_STEP_KG: f64 = 0.1;

impl RateRequest {
    /// Rejects requests no provider could quote.
    pub fn validate(&self) -> Result<()> {
        if self.from_pincode.trim().is_empty() || self.to_pincode.trim().is_empty() {
            return Err(ShippingError::InvalidRequest(
                "origin and destination pincodes are required".to_string(),
            ));
        }
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(ShippingError::InvalidRequest(format!(
                "weight must be positive, got {}",
                self.weight_kg
            )));
        }
        if let Some(cod) = self.cod_amount {
            if cod < 0.0 {
                return Err(ShippingError::InvalidRequest(
                    "cod amount cannot be negative".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_cod(&self) -> bool {
        self.cod_amount.map(|amount| amount > 0.0).unwrap_or(false)
    }

    /// Weight normalized to the cache precision (rounded up, never down, so a
    /// cached quote is never cheaper than the real slab).
    pub fn normalized_weight(&self) -> f64 {
        let steps = (self.weight_kg / WEIGHT_KEY_STEP_KG * 1e6).round() / 1e6;
        steps.ceil() * WEIGHT_KEY_STEP_KG
    }

    /// Cache key: route + package + mode. Pincodes are trimmed and lower-cased.
    pub fn cache_key(&self) -> RateCacheKey {
        RateCacheKey(format!(
            "{}|{}|{:.1}|{}|{}",
            self.from_pincode.trim().to_lowercase(),
            self.to_pincode.trim().to_lowercase(),
            self.normalized_weight(),
            self.mode,
            if self.is_cod() { "cod" } else { "prepaid" },
        ))
    }
}

/// Normalized rate cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateCacheKey(String);

impl RateCacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RateCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an aggregated rate set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Served from a fresh cache entry.
    Cache,
    /// Served from an expired entry (refresh in flight or refresh failed).
    StaleCache,
    /// Fetched from providers by this call or a joined in-flight refresh.
    Providers,
}

/// Result of a fan-out across all enabled providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRates {
    pub rates: Vec<ShippingRate>,
    /// Providers that failed during this aggregation. Empty when served from cache.
    pub failures: Vec<ProviderFailure>,
    pub source: RateSource,
}
