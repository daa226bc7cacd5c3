use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::provider::ProviderId;
use super::rate::ShippingRate;
use crate::error::{Result, ShippingError};

/// Caller-supplied pure selection function. Must return one of its input
/// rates, or `None`.
#[derive(Clone)]
pub struct CustomSelector(Arc<dyn Fn(&[ShippingRate]) -> Option<ShippingRate> + Send + Sync>);

impl CustomSelector {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[ShippingRate]) -> Option<ShippingRate> + Send + Sync + 'static,
    {
        CustomSelector(Arc::new(f))
    }

    pub fn call(&self, rates: &[ShippingRate]) -> Option<ShippingRate> {
        (self.0)(rates)
    }
}

impl std::fmt::Debug for CustomSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustomSelector(..)")
    }
}

/// Cost/speed weights for the balanced strategy. Omitted weights default so
/// that the pair sums to 1 (0.5/0.5 when both are omitted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BalancedWeights {
    #[serde(default)]
    pub cost_weight: Option<f64>,
    #[serde(default)]
    pub speed_weight: Option<f64>,
}

impl BalancedWeights {
    pub fn new(cost_weight: f64, speed_weight: f64) -> Self {
        BalancedWeights {
            cost_weight: Some(cost_weight),
            speed_weight: Some(speed_weight),
        }
    }

    /// Resolves to concrete `(cost, speed)` weights.
    pub fn resolve(&self) -> Result<(f64, f64)> {
        let in_range = |w: f64| (0.0..=1.0).contains(&w);
        let (cost, speed) = match (self.cost_weight, self.speed_weight) {
            (Some(cost), Some(speed)) => {
                if (cost + speed - 1.0).abs() > 1e-6 {
                    return Err(ShippingError::InvalidCriteria(format!(
                        "balanced weights must sum to 1, got {cost} + {speed}"
                    )));
                }
                (cost, speed)
            }
            (Some(cost), None) => (cost, 1.0 - cost),
            (None, Some(speed)) => (1.0 - speed, speed),
            (None, None) => (0.5, 0.5),
        };
        if !in_range(cost) || !in_range(speed) {
            return Err(ShippingError::InvalidCriteria(format!(
                "balanced weights must lie in [0, 1], got {cost} / {speed}"
            )));
        }
        Ok((cost, speed))
    }
}

/// How the selector ranks candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Lowest rate wins.
    #[default]
    Cheapest,
    /// Fewest estimated days wins.
    Fastest,
    /// Weighted blend of normalized cost and speed.
    Balanced(BalancedWeights),
    /// Registry priority order, regardless of cost or speed.
    Priority,
    /// Only rates from one provider are eligible.
    Specific {
        #[serde(alias = "specific_provider_id")]
        provider_id: ProviderId,
    },
    /// Injected selection function. Not available over the wire.
    #[serde(skip)]
    Custom(CustomSelector),
}

impl SelectionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::Cheapest => "cheapest",
            SelectionStrategy::Fastest => "fastest",
            SelectionStrategy::Balanced(_) => "balanced",
            SelectionStrategy::Priority => "priority",
            SelectionStrategy::Specific { .. } => "specific",
            SelectionStrategy::Custom(_) => "custom",
        }
    }
}

/// Filters and strategy applied to a set of rates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionCriteria {
    #[serde(flatten)]
    pub strategy: SelectionStrategy,
    #[serde(default)]
    pub max_cost: Option<f64>,
    #[serde(default)]
    pub max_days: Option<u32>,
    /// Providers ranked ahead of all others when they have a valid rate.
    #[serde(default)]
    pub preferred_providers: Vec<ProviderId>,
}

impl SelectionCriteria {
    pub fn new(strategy: SelectionStrategy) -> Self {
        SelectionCriteria {
            strategy,
            ..Default::default()
        }
    }

    pub fn cheapest() -> Self {
        Self::new(SelectionStrategy::Cheapest)
    }

    pub fn fastest() -> Self {
        Self::new(SelectionStrategy::Fastest)
    }

    pub fn balanced(weights: BalancedWeights) -> Self {
        Self::new(SelectionStrategy::Balanced(weights))
    }

    pub fn priority() -> Self {
        Self::new(SelectionStrategy::Priority)
    }

    pub fn specific(provider_id: impl Into<ProviderId>) -> Self {
        Self::new(SelectionStrategy::Specific {
            provider_id: provider_id.into(),
        })
    }

    pub fn custom(selector: CustomSelector) -> Self {
        Self::new(SelectionStrategy::Custom(selector))
    }

    pub fn with_max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    pub fn with_max_days(mut self, max_days: u32) -> Self {
        self.max_days = Some(max_days);
        self
    }

    pub fn with_preferred(mut self, providers: Vec<ProviderId>) -> Self {
        self.preferred_providers = providers;
        self
    }

    /// Provider pinned by the `specific` strategy, if any.
    pub fn specific_provider_id(&self) -> Option<&ProviderId> {
        match &self.strategy {
            SelectionStrategy::Specific { provider_id } => Some(provider_id),
            _ => None,
        }
    }
}

/// Why a rate was excluded before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterReason {
    Unavailable,
    ExceedsMaxCost { max_cost: f64 },
    ExceedsMaxDays { max_days: u32 },
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::Unavailable => write!(f, "unavailable"),
            FilterReason::ExceedsMaxCost { max_cost } => write!(f, "rate above max cost {max_cost:.2}"),
            FilterReason::ExceedsMaxDays { max_days } => write!(f, "slower than {max_days} days"),
        }
    }
}

/// A rate dropped by the filter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredRate {
    pub rate: ShippingRate,
    pub reason: FilterReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionMetadata {
    pub total_rates_evaluated: usize,
    pub rates_filtered: usize,
    pub selection_time_ms: f64,
}

/// Outcome of one `select` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected_rate: ShippingRate,
    /// Human-readable justification naming the strategy branch and tie-break.
    pub reason: String,
    /// Remaining valid candidates in ranking order, winner excluded.
    pub alternative_rates: Vec<ShippingRate>,
    pub filtered_rates: Vec<FilteredRate>,
    pub metadata: SelectionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_default_to_even_split() {
        assert_eq!(BalancedWeights::default().resolve().unwrap(), (0.5, 0.5));
    }

    #[test]
    fn test_single_weight_fills_the_other() {
        let w = BalancedWeights {
            cost_weight: Some(0.7),
            speed_weight: None,
        };
        let (cost, speed) = w.resolve().unwrap();
        assert!((cost - 0.7).abs() < 1e-9 && (speed - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(BalancedWeights::new(0.6, 0.6).resolve().is_err());
        assert!(BalancedWeights::new(1.2, -0.2).resolve().is_err());
    }

    #[test]
    fn test_criteria_deserialize_from_wire() {
        let c: SelectionCriteria =
            serde_json::from_str(r#"{"strategy":"specific","specific_provider_id":"p1","max_days":4}"#)
                .unwrap();
        assert_eq!(c.specific_provider_id(), Some(&ProviderId::from("p1")));
        assert_eq!(c.max_days, Some(4));

        let b: SelectionCriteria =
            serde_json::from_str(r#"{"strategy":"balanced","cost_weight":0.8,"speed_weight":0.2}"#)
                .unwrap();
        match b.strategy {
            SelectionStrategy::Balanced(weights) => {
                assert_eq!(weights.resolve().unwrap(), (0.8, 0.2))
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_custom_is_not_accepted_over_the_wire() {
        let parsed = serde_json::from_str::<SelectionCriteria>(r#"{"strategy":"custom"}"#);
        assert!(parsed.is_err());
    }
}
